//! At most one eligible child, picked at random.

use std::collections::HashSet;

use rand::seq::SliceRandom;

use super::parallel::parallel_candidates;
use super::{Interruptible, Strategy};
use crate::plan::Element;

#[derive(Debug, Default)]
pub struct RandomStrategy {
    interruptible: Interruptible,
}

impl RandomStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E: Element + ?Sized> Strategy<E> for RandomStrategy {
    fn candidates(&mut self, children: &[&E], dirty_assets: &HashSet<String>) -> Vec<usize> {
        if self.interruptible.is_interrupted() {
            return Vec::new();
        }
        let mut candidates = parallel_candidates(children, dirty_assets);
        candidates.shuffle(&mut rand::rng());
        candidates.truncate(1);
        candidates
    }

    fn interrupt(&mut self) {
        self.interruptible.interrupt();
    }

    fn proceed(&mut self) {
        self.interruptible.proceed();
    }

    fn is_interrupted(&self) -> bool {
        self.interruptible.is_interrupted()
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::element::fake::{elements, refs, FakeElement};
    use crate::plan::Status;

    #[test]
    fn test_picks_one_eligible_child() {
        let mut children = elements(&["a", "b", "c"]);
        children[0].status = Status::Complete;
        let mut strategy: Box<dyn Strategy<FakeElement>> = Box::new(RandomStrategy::new());
        for _ in 0..20 {
            let got = strategy.candidates(&refs(&children), &HashSet::new());
            assert_eq!(got.len(), 1);
            assert!(got[0] == 1 || got[0] == 2);
        }
    }

    #[test]
    fn test_nothing_eligible() {
        let children = elements(&["a"]);
        let dirty: HashSet<String> = ["a".to_string()].into();
        let mut strategy: Box<dyn Strategy<FakeElement>> = Box::new(RandomStrategy::new());
        assert!(strategy.candidates(&refs(&children), &dirty).is_empty());
    }
}

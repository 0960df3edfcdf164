//! Every eligible child at once.

use std::collections::HashSet;

use super::{DependencyStrategyHelper, Interruptible, Strategy};
use crate::plan::{is_eligible, Element};

#[derive(Debug, Default)]
pub struct ParallelStrategy {
    interruptible: Interruptible,
}

impl ParallelStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Eligible children of a parallel parent, in declaration order.
pub(super) fn parallel_candidates<E: Element + ?Sized>(
    children: &[&E],
    dirty_assets: &HashSet<String>,
) -> Vec<usize> {
    let mut helper = DependencyStrategyHelper::new();
    for i in 0..children.len() {
        helper.insert(&i);
    }
    helper.candidates(
        |&i| is_eligible(children[i], dirty_assets),
        |&i| children[i].is_complete(),
    )
}

impl<E: Element + ?Sized> Strategy<E> for ParallelStrategy {
    fn candidates(&mut self, children: &[&E], dirty_assets: &HashSet<String>) -> Vec<usize> {
        if self.interruptible.is_interrupted() {
            return Vec::new();
        }
        parallel_candidates(children, dirty_assets)
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
        "parallel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::element::fake::{elements, refs, FakeElement};
    use crate::plan::Status;

    #[test]
    fn test_all_eligible_children() {
        let mut children = elements(&["a", "b", "c", "d"]);
        children[1].status = Status::Complete;
        let dirty: HashSet<String> = ["c".to_string()].into();
        let mut strategy: Box<dyn Strategy<FakeElement>> = Box::new(ParallelStrategy::new());
        assert_eq!(strategy.candidates(&refs(&children), &dirty), vec![0, 3]);
    }

    #[test]
    fn test_interrupted_returns_nothing() {
        let children = elements(&["a"]);
        let mut strategy: Box<dyn Strategy<FakeElement>> = Box::new(ParallelStrategy::new());
        strategy.interrupt();
        assert!(strategy.is_interrupted());
        assert!(strategy.candidates(&refs(&children), &HashSet::new()).is_empty());
    }
}

//! One child at a time, in declaration order.

use std::collections::HashSet;

use super::{DependencyStrategyHelper, Interruptible, Strategy};
use crate::plan::{is_eligible, Element};

/// Chains every child to the one declared before it, so at most one child
/// is ever eligible: the first one that is not complete.
///
/// The chain is built on the first call and kept for the element's lifetime.
#[derive(Debug, Default)]
pub struct SerialStrategy {
    interruptible: Interruptible,
    helper: Option<DependencyStrategyHelper<usize>>,
}

impl SerialStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    fn helper(&mut self, len: usize) -> &DependencyStrategyHelper<usize> {
        self.helper.get_or_insert_with(|| {
            let mut helper = DependencyStrategyHelper::new();
            if len > 0 {
                helper.insert(&0);
            }
            for i in 1..len {
                helper.link(i, i - 1);
            }
            helper
        })
    }
}

impl<E: Element + ?Sized> Strategy<E> for SerialStrategy {
    fn candidates(&mut self, children: &[&E], dirty_assets: &HashSet<String>) -> Vec<usize> {
        if self.interruptible.is_interrupted() || children.is_empty() {
            return Vec::new();
        }
        let mut candidates = self.helper(children.len()).candidates(
            |&i| is_eligible(children[i], dirty_assets),
            |&i| children[i].is_complete(),
        );
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
        "serial"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::element::fake::{elements, refs, FakeElement};
    use crate::plan::Status;
    use proptest::prelude::{any, prop_assert, prop_assert_eq, proptest};

    fn serial() -> Box<dyn Strategy<FakeElement>> {
        Box::new(SerialStrategy::new())
    }

    #[test]
    fn test_first_incomplete_child_only() {
        let mut children = elements(&["a", "b", "c"]);
        let mut strategy = serial();
        let dirty = HashSet::new();

        assert_eq!(strategy.candidates(&refs(&children), &dirty), vec![0]);

        children[0].status = Status::Complete;
        assert_eq!(strategy.candidates(&refs(&children), &dirty), vec![1]);

        children[1].status = Status::Complete;
        children[2].status = Status::Complete;
        assert!(strategy.candidates(&refs(&children), &dirty).is_empty());
    }

    #[test]
    fn test_in_progress_child_blocks_successors() {
        let mut children = elements(&["a", "b"]);
        children[0].status = Status::InProgress;
        let mut strategy = serial();
        let dirty: HashSet<String> = ["a".to_string()].into();
        assert!(strategy.candidates(&refs(&children), &dirty).is_empty());
    }

    #[test]
    fn test_single_child() {
        let children = elements(&["only"]);
        let mut strategy = serial();
        assert_eq!(strategy.candidates(&refs(&children), &HashSet::new()), vec![0]);
    }

    #[test]
    fn test_interrupt_and_proceed() {
        let children = elements(&["a", "b"]);
        let mut strategy = serial();
        strategy.interrupt();
        assert!(strategy.candidates(&refs(&children), &HashSet::new()).is_empty());
        strategy.proceed();
        assert_eq!(strategy.candidates(&refs(&children), &HashSet::new()), vec![0]);
    }

    #[test]
    fn test_restarted_child_keeps_its_place() {
        let mut children = elements(&["a", "b", "c"]);
        children[0].status = Status::Complete;
        let mut strategy = serial();
        let dirty = HashSet::new();
        assert_eq!(strategy.candidates(&refs(&children), &dirty), vec![1]);

        children[1].status = Status::Complete;
        children[0].status = Status::Pending;
        assert_eq!(strategy.candidates(&refs(&children), &dirty), vec![0]);
    }

    proptest! {
        #[test]
        fn test_serial_exclusivity(complete in proptest::collection::vec(any::<bool>(), 1..12)) {
            let names: Vec<String> = (0..complete.len()).map(|i| format!("s{i}")).collect();
            let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let mut children = elements(&name_refs);
            for (child, done) in children.iter_mut().zip(&complete) {
                if *done {
                    child.status = Status::Complete;
                }
            }
            let mut strategy = serial();
            let got = strategy.candidates(&refs(&children), &HashSet::new());
            match complete.iter().position(|done| !done) {
                Some(i) => prop_assert_eq!(got, vec![i]),
                None => prop_assert!(got.is_empty()),
            }
        }
    }
}

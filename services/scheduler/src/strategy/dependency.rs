//! Candidates from explicit pairwise dependencies between named children.

use std::collections::HashSet;

use super::{DependencyStrategyHelper, Interruptible, Strategy};
use crate::error::PlanError;
use crate::plan::{is_eligible, Element};

/// Follows a caller-built dependency graph keyed by child name.
///
/// Children missing from the graph are never candidates.
#[derive(Debug)]
pub struct DependencyStrategy {
    interruptible: Interruptible,
    helper: DependencyStrategyHelper<String>,
}

impl DependencyStrategy {
    /// Fails if the graph names an element that is not one of `children`.
    pub fn new<'a>(
        helper: DependencyStrategyHelper<String>,
        children: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, PlanError> {
        let children: HashSet<&str> = children.into_iter().collect();
        if let Some(unknown) = helper.keys().find(|k| !children.contains(k.as_str())) {
            return Err(PlanError::UnknownElement(unknown.clone()));
        }
        Ok(Self {
            interruptible: Interruptible::default(),
            helper,
        })
    }
}

impl<E: Element + ?Sized> Strategy<E> for DependencyStrategy {
    fn candidates(&mut self, children: &[&E], dirty_assets: &HashSet<String>) -> Vec<usize> {
        if self.interruptible.is_interrupted() {
            return Vec::new();
        }
        let index_of = |name: &String| children.iter().position(|c| c.name() == name);
        self.helper
            .candidates(
                |name| index_of(name).is_some_and(|i| is_eligible(children[i], dirty_assets)),
                |name| index_of(name).is_some_and(|i| children[i].is_complete()),
            )
            .iter()
            .filter_map(index_of)
            .collect()
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
        "dependency"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::element::fake::{elements, refs, FakeElement};
    use crate::plan::Status;

    fn diamond() -> DependencyStrategyHelper<String> {
        // a -> {b, c} -> d
        let mut helper = DependencyStrategyHelper::new();
        for name in ["a", "b", "c", "d"] {
            helper.add_element(name.to_string()).unwrap();
        }
        helper.add_dependency("b".to_string(), "a".to_string()).unwrap();
        helper.add_dependency("c".to_string(), "a".to_string()).unwrap();
        helper.add_dependency("d".to_string(), "b".to_string()).unwrap();
        helper.add_dependency("d".to_string(), "c".to_string()).unwrap();
        helper
    }

    #[test]
    fn test_diamond() {
        let mut children = elements(&["a", "b", "c", "d"]);
        let mut strategy: Box<dyn Strategy<FakeElement>> =
            Box::new(DependencyStrategy::new(diamond(), ["a", "b", "c", "d"]).unwrap());
        let dirty = HashSet::new();

        assert_eq!(strategy.candidates(&refs(&children), &dirty), vec![0]);

        children[0].status = Status::Complete;
        assert_eq!(strategy.candidates(&refs(&children), &dirty), vec![1, 2]);

        children[1].status = Status::Complete;
        assert_eq!(strategy.candidates(&refs(&children), &dirty), vec![2]);

        children[2].status = Status::Complete;
        assert_eq!(strategy.candidates(&refs(&children), &dirty), vec![3]);
    }

    #[test]
    fn test_graph_naming_a_missing_child_is_rejected() {
        let mut helper = DependencyStrategyHelper::new();
        helper.add_element("a".to_string()).unwrap();
        helper.add_element("ghost".to_string()).unwrap();
        helper.add_dependency("a".to_string(), "ghost".to_string()).unwrap();

        let err = DependencyStrategy::new(helper, ["a"]).unwrap_err();
        assert_eq!(err, PlanError::UnknownElement("ghost".to_string()));
    }

    #[test]
    fn test_child_outside_graph_is_never_a_candidate() {
        let mut helper = DependencyStrategyHelper::new();
        helper.add_element("a".to_string()).unwrap();
        let children = elements(&["a", "b"]);
        let mut strategy: Box<dyn Strategy<FakeElement>> =
            Box::new(DependencyStrategy::new(helper, ["a", "b"]).unwrap());
        assert_eq!(strategy.candidates(&refs(&children), &HashSet::new()), vec![0]);
    }
}

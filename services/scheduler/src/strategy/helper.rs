//! Dependency bookkeeping behind every strategy.

use std::collections::HashSet;
use std::hash::Hash;

use crate::error::PlanError;

/// Maps each element to the elements that must complete before it.
///
/// Keys keep their registration order, which is the order candidates are
/// returned in.
#[derive(Debug, Clone)]
pub struct DependencyStrategyHelper<K> {
    entries: Vec<(K, HashSet<K>)>,
}

impl<K> Default for DependencyStrategyHelper<K> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<K: Clone + Eq + Hash + std::fmt::Display> DependencyStrategyHelper<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: &K) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    /// Registers `key` if absent; never fails.
    pub(crate) fn insert(&mut self, key: &K) {
        self.ensure(key);
    }

    fn ensure(&mut self, key: &K) -> usize {
        match self.position(key) {
            Some(i) => i,
            None => {
                self.entries.push((key.clone(), HashSet::new()));
                self.entries.len() - 1
            }
        }
    }

    /// Registers an element with no prerequisites.
    pub fn add_element(&mut self, key: K) -> Result<(), PlanError> {
        if self.position(&key).is_some() {
            return Err(PlanError::DuplicateElement(key.to_string()));
        }
        self.entries.push((key, HashSet::new()));
        Ok(())
    }

    /// `child` may only run once `parent` is complete. Both must already be
    /// registered with [`add_element`](Self::add_element).
    pub fn add_dependency(&mut self, child: K, parent: K) -> Result<(), PlanError> {
        if self.position(&parent).is_none() {
            return Err(PlanError::UnknownElement(parent.to_string()));
        }
        let Some(i) = self.position(&child) else {
            return Err(PlanError::UnknownElement(child.to_string()));
        };
        self.entries[i].1.insert(parent);
        Ok(())
    }

    /// Like [`add_dependency`](Self::add_dependency), registering either end
    /// on the fly.
    pub(crate) fn link(&mut self, child: K, parent: K) {
        self.ensure(&parent);
        let i = self.ensure(&child);
        self.entries[i].1.insert(parent);
    }

    pub fn contains(&self, key: &K) -> bool {
        self.position(key).is_some()
    }

    pub fn dependencies(&self, key: &K) -> Option<&HashSet<K>> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, deps)| deps)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// Elements that are eligible and whose prerequisites are all complete.
    pub fn candidates(
        &self,
        is_eligible: impl Fn(&K) -> bool,
        is_complete: impl Fn(&K) -> bool,
    ) -> Vec<K> {
        self.entries
            .iter()
            .filter(|(k, _)| is_eligible(k))
            .filter(|(_, deps)| deps.iter().all(&is_complete))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_element_is_rejected() {
        let mut helper = DependencyStrategyHelper::new();
        helper.add_element("a".to_string()).unwrap();
        let err = helper.add_element("a".to_string()).unwrap_err();
        assert_eq!(err, PlanError::DuplicateElement("a".to_string()));
    }

    #[test]
    fn test_dependency_on_unregistered_element_is_rejected() {
        let mut helper = DependencyStrategyHelper::new();
        helper.add_element("b".to_string()).unwrap();

        let err = helper
            .add_dependency("b".to_string(), "a".to_string())
            .unwrap_err();
        assert_eq!(err, PlanError::UnknownElement("a".to_string()));

        let err = helper
            .add_dependency("c".to_string(), "b".to_string())
            .unwrap_err();
        assert_eq!(err, PlanError::UnknownElement("c".to_string()));
        assert!(helper.dependencies(&"b".to_string()).unwrap().is_empty());
    }

    #[test]
    fn test_link_registers_both_ends() {
        let mut helper = DependencyStrategyHelper::new();
        helper.link("b".to_string(), "a".to_string());
        assert!(helper.contains(&"a".to_string()));
        assert!(helper.dependencies(&"b".to_string()).unwrap().contains("a"));
        assert!(helper.dependencies(&"a".to_string()).unwrap().is_empty());
    }

    #[test]
    fn test_candidates_wait_for_prerequisites() {
        let mut helper = DependencyStrategyHelper::new();
        for i in 0..3usize {
            helper.add_element(i).unwrap();
        }
        helper.add_dependency(1, 0).unwrap();
        helper.add_dependency(2, 0).unwrap();

        let complete: HashSet<usize> = HashSet::new();
        let got = helper.candidates(|k| !complete.contains(k), |k| complete.contains(k));
        assert_eq!(got, vec![0]);

        let complete: HashSet<usize> = [0].into();
        let got = helper.candidates(|k| !complete.contains(k), |k| complete.contains(k));
        assert_eq!(got, vec![1, 2]);
    }
}

//! Decommission ordering.

use std::cmp::Ordering;

use keel_cluster::pod_instance_name;

/// Sort key deciding the order in which pods are decommissioned.
///
/// Pod types missing from the service spec go first, alphabetically. Listed
/// types follow in reverse declaration order. Within a type, higher indices
/// go first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodKey {
    pod_type: String,
    index: u32,
    /// Position in the reversed list of declared pod types.
    type_rank: Option<usize>,
}

impl PodKey {
    /// `reversed_types` lists the declared pod types, last declared first.
    pub fn new(pod_type: impl Into<String>, index: u32, reversed_types: &[&str]) -> Self {
        let pod_type = pod_type.into();
        let type_rank = reversed_types.iter().position(|t| *t == pod_type);
        Self {
            pod_type,
            index,
            type_rank,
        }
    }

    pub fn pod_type(&self) -> &str {
        &self.pod_type
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn pod_name(&self) -> String {
        pod_instance_name(&self.pod_type, self.index)
    }
}

impl Ord for PodKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.type_rank
            .cmp(&other.type_rank)
            .then_with(|| self.pod_type.cmp(&other.pod_type))
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for PodKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REVERSED: &[&str] = &["c", "b", "a"];

    fn key(pod_type: &str, index: u32) -> PodKey {
        PodKey::new(pod_type, index, REVERSED)
    }

    #[test]
    fn test_later_types_first() {
        assert!(key("b", 0) < key("a", 5));
        assert!(key("c", 0) < key("b", 0));
    }

    #[test]
    fn test_unknown_types_first_alphabetically() {
        assert!(key("zz", 0) < key("c", 9));
        assert!(key("x", 0) < key("y", 3));
    }

    #[test]
    fn test_higher_index_first() {
        let mut keys = vec![key("a", 0), key("a", 2), key("a", 1)];
        keys.sort();
        let names: Vec<String> = keys.iter().map(PodKey::pod_name).collect();
        assert_eq!(names, vec!["a-2", "a-1", "a-0"]);
    }
}

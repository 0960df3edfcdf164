//! Requirements handed to the offer evaluator.

use std::collections::BTreeMap;

use keel_cluster::{pod_instance_name, task_name};
use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::spec::PodSpec;

/// How a failed pod is brought back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryType {
    /// Not a recovery, or the pod's tasks disagree on how to recover.
    None,
    /// Relaunch on the resources already reserved.
    Transient,
    /// Give up the old reservations and reserve new resources.
    Permanent,
}

/// One instance of a pod spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodInstance {
    pub spec: PodSpec,
    pub index: u32,
}

impl PodInstance {
    pub fn pod_type(&self) -> &str {
        &self.spec.pod_type
    }

    /// `{pod_type}-{index}`; also the asset name used for mutual exclusion.
    pub fn name(&self) -> String {
        pod_instance_name(&self.spec.pod_type, self.index)
    }

    pub fn task_name(&self, task_spec: &str) -> String {
        task_name(&self.spec.pod_type, self.index, task_spec)
    }
}

/// Which tasks of a pod instance to launch, and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodInstanceRequirement {
    pod: PodInstance,
    tasks_to_launch: Vec<String>,
    recovery_type: RecoveryType,
    environment: BTreeMap<String, String>,
}

impl PodInstanceRequirement {
    /// Fails if no tasks are listed or a listed task is not part of the pod.
    pub fn new(pod: PodInstance, tasks_to_launch: Vec<String>) -> Result<Self, PlanError> {
        if tasks_to_launch.is_empty() {
            return Err(PlanError::InvalidRequirement(format!(
                "no tasks to launch for pod '{}'",
                pod.name()
            )));
        }
        if let Some(unknown) = tasks_to_launch.iter().find(|t| pod.spec.task(t).is_none()) {
            return Err(PlanError::InvalidRequirement(format!(
                "task '{unknown}' is not defined in pod '{}'",
                pod.pod_type()
            )));
        }
        if pod.index >= pod.spec.count {
            return Err(PlanError::InvalidRequirement(format!(
                "pod index {} exceeds count {} for '{}'",
                pod.index,
                pod.spec.count,
                pod.pod_type()
            )));
        }
        Ok(Self {
            pod,
            tasks_to_launch,
            recovery_type: RecoveryType::None,
            environment: BTreeMap::new(),
        })
    }

    #[must_use]
    pub fn with_recovery_type(mut self, recovery_type: RecoveryType) -> Self {
        self.recovery_type = recovery_type;
        self
    }

    #[must_use]
    pub fn with_environment(mut self, environment: BTreeMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    pub fn pod(&self) -> &PodInstance {
        &self.pod
    }

    pub fn tasks_to_launch(&self) -> &[String] {
        &self.tasks_to_launch
    }

    /// Full task names of the tasks to launch.
    pub fn task_names(&self) -> Vec<String> {
        self.tasks_to_launch
            .iter()
            .map(|t| self.pod.task_name(t))
            .collect()
    }

    pub fn recovery_type(&self) -> RecoveryType {
        self.recovery_type
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    pub fn asset(&self) -> String {
        self.pod.name()
    }

    /// `{pod}:[{task}, ...]`
    pub fn name(&self) -> String {
        format!("{}:[{}]", self.pod.name(), self.tasks_to_launch.join(", "))
    }

    pub fn conflicts_with(&self, other: &PodInstanceRequirement) -> bool {
        self.pod.pod_type() == other.pod.pod_type() && self.pod.index == other.pod.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::fixtures;

    fn instance(index: u32) -> PodInstance {
        PodInstance {
            spec: fixtures::pod("node", 2),
            index,
        }
    }

    #[test]
    fn test_names() {
        let req = PodInstanceRequirement::new(instance(1), vec!["server".to_string()]).unwrap();
        assert_eq!(req.asset(), "node-1");
        assert_eq!(req.name(), "node-1:[server]");
        assert_eq!(req.task_names(), vec!["node-1-server".to_string()]);
        assert_eq!(req.recovery_type(), RecoveryType::None);
    }

    #[test]
    fn test_rejects_unknown_task() {
        let err = PodInstanceRequirement::new(instance(0), vec!["sidecar".to_string()]).unwrap_err();
        assert!(matches!(err, PlanError::InvalidRequirement(_)));
    }

    #[test]
    fn test_rejects_empty_task_list() {
        assert!(PodInstanceRequirement::new(instance(0), vec![]).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_index() {
        assert!(PodInstanceRequirement::new(instance(2), vec!["server".to_string()]).is_err());
    }

    #[test]
    fn test_conflicts() {
        let a = PodInstanceRequirement::new(instance(0), vec!["server".to_string()]).unwrap();
        let b = a.clone().with_recovery_type(RecoveryType::Permanent);
        let c = PodInstanceRequirement::new(instance(1), vec!["server".to_string()]).unwrap();
        assert!(a.conflicts_with(&b));
        assert!(!a.conflicts_with(&c));
    }
}

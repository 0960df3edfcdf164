//! Declarative service description.
//!
//! A [`ServiceSpec`] lists pod types in deployment order. Each pod type runs
//! `count` instances of the same set of tasks. The hash of the spec is the
//! target configuration ID stamped onto every launched task.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("failed to read service spec: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse service spec: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid service spec: {0}")]
    Invalid(String),
}

/// Desired lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalState {
    /// Keep the task running.
    Running,
    /// Run to completion, again after every configuration change.
    Finish,
    /// Run to completion once.
    Once,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub path: String,
    pub size_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub goal: GoalState,
    pub cpus: f64,
    pub memory_mb: f64,
    #[serde(default)]
    pub disk_mb: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<VolumeSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    #[serde(rename = "type")]
    pub pod_type: String,
    pub count: u32,
    /// Strategy for the steps of this pod's deploy phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    pub tasks: Vec<TaskSpec>,
}

impl PodSpec {
    pub fn task(&self, name: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    /// Strategy across the deploy plan's phases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_strategy: Option<String>,
    pub pods: Vec<PodSpec>,
}

impl ServiceSpec {
    pub fn from_toml(raw: &str) -> Result<Self, SpecError> {
        let spec: Self = toml::from_str(raw)?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SpecError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn pod(&self, pod_type: &str) -> Option<&PodSpec> {
        self.pods.iter().find(|p| p.pod_type == pod_type)
    }

    pub fn validate(&self) -> Result<(), SpecError> {
        if self.name.is_empty() {
            return Err(SpecError::Invalid("service name is empty".to_string()));
        }
        let mut pod_types = HashSet::new();
        for pod in &self.pods {
            if !pod_types.insert(pod.pod_type.as_str()) {
                return Err(SpecError::Invalid(format!(
                    "duplicate pod type '{}'",
                    pod.pod_type
                )));
            }
            if pod.tasks.is_empty() {
                return Err(SpecError::Invalid(format!(
                    "pod '{}' declares no tasks",
                    pod.pod_type
                )));
            }
            let mut task_names = HashSet::new();
            for task in &pod.tasks {
                if !task_names.insert(task.name.as_str()) {
                    return Err(SpecError::Invalid(format!(
                        "duplicate task '{}' in pod '{}'",
                        task.name, pod.pod_type
                    )));
                }
                if task.cpus <= 0.0 || task.memory_mb <= 0.0 {
                    return Err(SpecError::Invalid(format!(
                        "task '{}' in pod '{}' must request cpus and memory",
                        task.name, pod.pod_type
                    )));
                }
            }
        }
        Ok(())
    }

    /// Target configuration ID: SHA-256 of the spec's JSON form.
    pub fn config_id(&self) -> Result<String, SpecError> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| SpecError::Invalid(format!("unserializable spec: {e}")))?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = r#"
name = "cassandra"

[[pods]]
type = "node"
count = 3
strategy = "serial-canary"

[[pods.tasks]]
name = "server"
goal = "RUNNING"
cpus = 1.0
memory_mb = 2048
volume = { path = "data", size_mb = 5000 }

[[pods.tasks]]
name = "init"
goal = "ONCE"
cpus = 0.1
memory_mb = 32
"#;

    #[test]
    fn test_parse_toml() {
        let spec = ServiceSpec::from_toml(SPEC).unwrap();
        assert_eq!(spec.pods.len(), 1);
        let node = spec.pod("node").unwrap();
        assert_eq!(node.count, 3);
        assert_eq!(node.strategy.as_deref(), Some("serial-canary"));
        assert_eq!(node.task("init").unwrap().goal, GoalState::Once);
        assert_eq!(node.task("server").unwrap().volume.as_ref().unwrap().size_mb, 5000.0);
    }

    #[test]
    fn test_config_id_tracks_content() {
        let spec = ServiceSpec::from_toml(SPEC).unwrap();
        let mut scaled = spec.clone();
        scaled.pods[0].count = 2;
        assert_eq!(spec.config_id().unwrap(), spec.clone().config_id().unwrap());
        assert_ne!(spec.config_id().unwrap(), scaled.config_id().unwrap());
        assert_eq!(spec.config_id().unwrap().len(), 64);
    }

    #[test]
    fn test_rejects_duplicate_pod_types() {
        let spec = fixtures::service(vec![fixtures::pod("a", 1), fixtures::pod("a", 2)]);
        assert!(matches!(spec.validate(), Err(SpecError::Invalid(_))));
    }

    #[test]
    fn test_rejects_zero_resources() {
        let mut spec = fixtures::service(vec![fixtures::pod("a", 1)]);
        spec.pods[0].tasks[0].cpus = 0.0;
        assert!(spec.validate().is_err());
    }
}

//! Persistent scheduler state.
//!
//! The store holds the scheduler's record of every launched task, the last
//! status reported for it, per-task goal overrides, the framework ID and the
//! current target configuration. Each call is independently atomic; nothing
//! spans more than one call. An empty store answers with empty collections.

mod memory;
mod sqlite;

use keel_cluster::{TaskInfo, TaskStatus};
use keel_id::FrameworkId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryStateStore;
pub use sqlite::SqliteStateStore;

/// Errors from state store operations.
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("state not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    Invalid(String),
}

/// Goal a task is forced towards regardless of its spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalOverride {
    None,
    Decommissioned,
}

/// How far a [`GoalOverride`] has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverrideProgress {
    Pending,
    InProgress,
    Complete,
}

/// Persisted (target, progress) pair for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GoalOverrideStatus {
    pub target: GoalOverride,
    pub progress: OverrideProgress,
}

impl GoalOverrideStatus {
    pub const INACTIVE: Self = Self {
        target: GoalOverride::None,
        progress: OverrideProgress::Complete,
    };

    pub const DECOMMISSION_PENDING: Self = Self {
        target: GoalOverride::Decommissioned,
        progress: OverrideProgress::Pending,
    };

    pub const DECOMMISSIONING: Self = Self {
        target: GoalOverride::Decommissioned,
        progress: OverrideProgress::InProgress,
    };

    pub fn is_decommission(&self) -> bool {
        self.target == GoalOverride::Decommissioned
    }
}

impl Default for GoalOverrideStatus {
    fn default() -> Self {
        Self::INACTIVE
    }
}

/// Storage for task records, statuses and scheduler properties.
pub trait StateStore: Send + Sync {
    /// Inserts or replaces task records by name.
    fn store_tasks(&self, tasks: &[TaskInfo]) -> Result<(), StateStoreError>;

    /// All task records, ordered by name.
    fn fetch_tasks(&self) -> Result<Vec<TaskInfo>, StateStoreError>;

    fn fetch_task(&self, task_name: &str) -> Result<Option<TaskInfo>, StateStoreError>;

    /// Records the latest status of a stored task.
    ///
    /// Fails with [`StateStoreError::NotFound`] if the task is not stored.
    fn store_status(&self, task_name: &str, status: &TaskStatus) -> Result<(), StateStoreError>;

    fn fetch_status(&self, task_name: &str) -> Result<Option<TaskStatus>, StateStoreError>;

    /// Override of the named task; [`GoalOverrideStatus::INACTIVE`] when unset.
    fn fetch_goal_override_status(
        &self,
        task_name: &str,
    ) -> Result<GoalOverrideStatus, StateStoreError>;

    fn store_goal_override_status(
        &self,
        task_name: &str,
        status: GoalOverrideStatus,
    ) -> Result<(), StateStoreError>;

    /// Removes the task record, its status and its override.
    fn clear_task(&self, task_name: &str) -> Result<(), StateStoreError>;

    fn fetch_framework_id(&self) -> Result<Option<FrameworkId>, StateStoreError>;

    fn store_framework_id(&self, id: FrameworkId) -> Result<(), StateStoreError>;

    fn fetch_target_config(&self) -> Result<Option<String>, StateStoreError>;

    fn store_target_config(&self, config_id: &str) -> Result<(), StateStoreError>;
}

#[cfg(test)]
pub(crate) mod fixtures {
    use keel_cluster::Resource;
    use keel_id::{ResourceId, TaskId};

    use super::*;

    /// A stored task record for `{pod_type}-{index}-{task}`.
    pub fn task_info(pod_type: &str, index: u32, task: &str) -> TaskInfo {
        let name = keel_cluster::task_name(pod_type, index, task);
        TaskInfo {
            task_id: TaskId::new(name.clone()).unwrap(),
            name,
            agent_id: None,
            pod_type: pod_type.to_string(),
            pod_index: index,
            task_spec: task.to_string(),
            resources: vec![
                Resource::reserved(ResourceId::new(), "cpus", 0.5),
                Resource::reserved(ResourceId::new(), "mem", 256.0),
            ],
            target_config: "cfg".to_string(),
            environment: Default::default(),
            permanently_failed: false,
        }
    }
}

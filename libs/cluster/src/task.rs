//! Task records and status updates.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use keel_id::{AgentId, TaskId};
use serde::{Deserialize, Serialize};

use crate::Resource;

/// Task state as reported by the cluster manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Staging,
    Starting,
    Running,
    Killing,
    Finished,
    Failed,
    Killed,
    Error,
    Lost,
}

impl TaskState {
    /// The task is no longer running and will not run again on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Failed | Self::Killed | Self::Error | Self::Lost
        )
    }

    /// The task ended without reaching a goal state.
    pub fn needs_recovery(&self) -> bool {
        matches!(self, Self::Failed | Self::Killed | Self::Error | Self::Lost)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staging => "TASK_STAGING",
            Self::Starting => "TASK_STARTING",
            Self::Running => "TASK_RUNNING",
            Self::Killing => "TASK_KILLING",
            Self::Finished => "TASK_FINISHED",
            Self::Failed => "TASK_FAILED",
            Self::Killed => "TASK_KILLED",
            Self::Error => "TASK_ERROR",
            Self::Lost => "TASK_LOST",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status update for one task launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl TaskStatus {
    pub fn new(task_id: TaskId, state: TaskState) -> Self {
        Self {
            task_id,
            state,
            message: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// The scheduler's record of a task it launched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Stable task name, `{pod_type}-{pod_index}-{task_spec}`.
    pub name: String,
    /// ID of the most recent launch.
    pub task_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    pub pod_type: String,
    pub pod_index: u32,
    /// Name of the task within its pod spec.
    pub task_spec: String,
    /// Reserved resources owned by this task.
    #[serde(default)]
    pub resources: Vec<Resource>,
    /// Target configuration the task was launched with.
    pub target_config: String,
    /// Environment overrides supplied through plan parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    /// Set by an operator to force destructive recovery.
    #[serde(default)]
    pub permanently_failed: bool,
}

impl TaskInfo {
    /// Name of the pod instance this task belongs to.
    pub fn pod_instance_name(&self) -> String {
        pod_instance_name(&self.pod_type, self.pod_index)
    }
}

/// `{pod_type}-{index}`
pub fn pod_instance_name(pod_type: &str, index: u32) -> String {
    format!("{pod_type}-{index}")
}

/// `{pod_type}-{index}-{task_spec}`
pub fn task_name(pod_type: &str, index: u32, task_spec: &str) -> String {
    format!("{pod_type}-{index}-{task_spec}")
}

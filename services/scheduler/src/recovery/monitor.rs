//! Classification of failed tasks as permanently failed.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use keel_cluster::{TaskInfo, TaskState, TaskStatus};
use keel_id::TaskId;
use tracing::info;

/// Decides when a failed task should be recovered by replacing its
/// resources rather than relaunching in place.
pub trait FailureMonitor: Send + Sync {
    fn has_failed(&self, task: &TaskInfo) -> bool;

    /// Sees every task status the scheduler accepts.
    fn observe(&self, _status: &TaskStatus) {}
}

/// Never declares a task permanently failed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverFailureMonitor;

impl FailureMonitor for NeverFailureMonitor {
    fn has_failed(&self, _task: &TaskInfo) -> bool {
        false
    }
}

/// A task is permanently failed once it has stayed failed for `timeout`.
#[derive(Debug)]
pub struct TimedFailureMonitor {
    timeout: Duration,
    failed_since: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl TimedFailureMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            failed_since: Mutex::new(HashMap::new()),
        }
    }
}

impl FailureMonitor for TimedFailureMonitor {
    fn has_failed(&self, task: &TaskInfo) -> bool {
        let failed_since = self
            .failed_since
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(since) = failed_since.get(&task.name) else {
            return false;
        };
        let Ok(timeout) = chrono::Duration::from_std(self.timeout) else {
            return false;
        };
        let failed = Utc::now() - *since >= timeout;
        if failed {
            info!(task = %task.name, since = %since, "Task failed for longer than timeout");
        }
        failed
    }

    fn observe(&self, status: &TaskStatus) {
        let mut failed_since = self
            .failed_since
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let name = status.task_id.task_name().to_string();
        if status.state.needs_recovery() {
            failed_since.entry(name).or_insert(status.timestamp);
        } else if status.state == TaskState::Running {
            failed_since.remove(&name);
        }
    }
}

#[derive(Debug, Default)]
struct FailureCount {
    count: usize,
    last_failed: Option<TaskId>,
}

/// A task is permanently failed after `threshold` consecutive failed launches.
#[derive(Debug)]
pub struct CountingFailureMonitor {
    threshold: usize,
    counts: Mutex<HashMap<String, FailureCount>>,
}

impl CountingFailureMonitor {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            counts: Mutex::new(HashMap::new()),
        }
    }
}

impl FailureMonitor for CountingFailureMonitor {
    fn has_failed(&self, task: &TaskInfo) -> bool {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&task.name)
            .is_some_and(|c| c.count >= self.threshold)
    }

    fn observe(&self, status: &TaskStatus) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let name = status.task_id.task_name().to_string();
        if status.state.needs_recovery() {
            let entry = counts.entry(name).or_default();
            // Repeated reports for the same launch count once.
            if entry.last_failed.as_ref() != Some(&status.task_id) {
                entry.count += 1;
                entry.last_failed = Some(status.task_id.clone());
            }
        } else if status.state == TaskState::Running {
            counts.remove(&name);
        }
    }
}

//! In-process state store.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use keel_cluster::{TaskInfo, TaskStatus};
use keel_id::FrameworkId;

use super::{GoalOverrideStatus, StateStore, StateStoreError};

#[derive(Debug, Default)]
struct Inner {
    tasks: BTreeMap<String, TaskInfo>,
    statuses: BTreeMap<String, TaskStatus>,
    overrides: BTreeMap<String, GoalOverrideStatus>,
    framework_id: Option<FrameworkId>,
    target_config: Option<String>,
}

/// State store kept entirely in memory. Lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    inner: Mutex<Inner>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StateStoreError> {
        self.inner
            .lock()
            .map_err(|_| StateStoreError::Invalid("state store lock poisoned".to_string()))
    }
}

impl StateStore for MemoryStateStore {
    fn store_tasks(&self, tasks: &[TaskInfo]) -> Result<(), StateStoreError> {
        let mut inner = self.lock()?;
        for task in tasks {
            inner.tasks.insert(task.name.clone(), task.clone());
        }
        Ok(())
    }

    fn fetch_tasks(&self) -> Result<Vec<TaskInfo>, StateStoreError> {
        Ok(self.lock()?.tasks.values().cloned().collect())
    }

    fn fetch_task(&self, task_name: &str) -> Result<Option<TaskInfo>, StateStoreError> {
        Ok(self.lock()?.tasks.get(task_name).cloned())
    }

    fn store_status(&self, task_name: &str, status: &TaskStatus) -> Result<(), StateStoreError> {
        let mut inner = self.lock()?;
        if !inner.tasks.contains_key(task_name) {
            return Err(StateStoreError::NotFound(format!("task {task_name}")));
        }
        inner.statuses.insert(task_name.to_string(), status.clone());
        Ok(())
    }

    fn fetch_status(&self, task_name: &str) -> Result<Option<TaskStatus>, StateStoreError> {
        Ok(self.lock()?.statuses.get(task_name).cloned())
    }

    fn fetch_goal_override_status(
        &self,
        task_name: &str,
    ) -> Result<GoalOverrideStatus, StateStoreError> {
        Ok(self
            .lock()?
            .overrides
            .get(task_name)
            .copied()
            .unwrap_or_default())
    }

    fn store_goal_override_status(
        &self,
        task_name: &str,
        status: GoalOverrideStatus,
    ) -> Result<(), StateStoreError> {
        self.lock()?.overrides.insert(task_name.to_string(), status);
        Ok(())
    }

    fn clear_task(&self, task_name: &str) -> Result<(), StateStoreError> {
        let mut inner = self.lock()?;
        inner.tasks.remove(task_name);
        inner.statuses.remove(task_name);
        inner.overrides.remove(task_name);
        Ok(())
    }

    fn fetch_framework_id(&self) -> Result<Option<FrameworkId>, StateStoreError> {
        Ok(self.lock()?.framework_id)
    }

    fn store_framework_id(&self, id: FrameworkId) -> Result<(), StateStoreError> {
        self.lock()?.framework_id = Some(id);
        Ok(())
    }

    fn fetch_target_config(&self) -> Result<Option<String>, StateStoreError> {
        Ok(self.lock()?.target_config.clone())
    }

    fn store_target_config(&self, config_id: &str) -> Result<(), StateStoreError> {
        self.lock()?.target_config = Some(config_id.to_string());
        Ok(())
    }
}

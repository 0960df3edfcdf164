//! Persisting the effects of accepted operations.

use std::sync::Arc;

use keel_cluster::{OfferRecommendation, TaskState, TaskStatus};
use tracing::{debug, info};

use crate::store::{StateStore, StateStoreError};

/// Observes every operation before it is sent to the cluster manager.
pub trait OperationRecorder: Send + Sync {
    fn record(&self, recommendation: &OfferRecommendation) -> Result<(), StateStoreError>;
}

/// Stores the task record of every launch.
pub struct PersistentLaunchRecorder {
    store: Arc<dyn StateStore>,
}

impl PersistentLaunchRecorder {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }
}

impl OperationRecorder for PersistentLaunchRecorder {
    fn record(&self, recommendation: &OfferRecommendation) -> Result<(), StateStoreError> {
        let OfferRecommendation::Launch {
            task, transient, ..
        } = recommendation
        else {
            return Ok(());
        };

        self.store.store_tasks(std::slice::from_ref(&**task))?;
        if !*transient {
            let status = TaskStatus::new(task.task_id.clone(), TaskState::Staging)
                .with_message("launch accepted");
            self.store.store_status(&task.name, &status)?;
            debug!(task_id = %task.task_id, "Recorded task launch");
        }
        Ok(())
    }
}

/// Removes released resources from the task records that owned them.
pub struct DecommissionRecorder {
    store: Arc<dyn StateStore>,
}

impl DecommissionRecorder {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }
}

impl OperationRecorder for DecommissionRecorder {
    fn record(&self, recommendation: &OfferRecommendation) -> Result<(), StateStoreError> {
        let Some(released) = recommendation.released_resource().and_then(|r| r.id) else {
            return Ok(());
        };

        let mut updated = Vec::new();
        for mut task in self.store.fetch_tasks()? {
            let before = task.resources.len();
            task.resources.retain(|r| r.id != Some(released));
            if task.resources.len() != before {
                info!(task = %task.name, resource_id = %released, "Removed released resource from task");
                updated.push(task);
            }
        }
        if !updated.is_empty() {
            self.store.store_tasks(&updated)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::task_info;
    use crate::store::MemoryStateStore;
    use keel_id::OfferId;

    #[test]
    fn test_launch_recorded_with_staging_status() {
        let store = Arc::new(MemoryStateStore::new());
        let recorder = PersistentLaunchRecorder::new(store.clone());
        let task = task_info("node", 0, "server");

        recorder
            .record(&OfferRecommendation::Launch {
                offer_id: OfferId::new(),
                task: Box::new(task.clone()),
                transient: false,
            })
            .unwrap();

        assert_eq!(store.fetch_task(&task.name).unwrap(), Some(task.clone()));
        let status = store.fetch_status(&task.name).unwrap().unwrap();
        assert_eq!(status.state, TaskState::Staging);
        assert_eq!(status.task_id, task.task_id);
    }

    #[test]
    fn test_unreserve_strips_resource() {
        let store = Arc::new(MemoryStateStore::new());
        let task = task_info("node", 3, "server");
        store.store_tasks(&[task.clone()]).unwrap();

        let recorder = DecommissionRecorder::new(store.clone());
        recorder
            .record(&OfferRecommendation::Unreserve {
                offer_id: OfferId::new(),
                resource: task.resources[0].clone(),
            })
            .unwrap();

        let stored = store.fetch_task(&task.name).unwrap().unwrap();
        assert_eq!(stored.resources, task.resources[1..].to_vec());
    }
}

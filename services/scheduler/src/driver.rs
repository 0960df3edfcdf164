//! Outbound calls to the cluster manager.
//!
//! The RPC protocol itself lives outside this crate. The scheduler talks to it
//! through [`SchedulerDriver`]; [`RecordingDriver`] logs every call and keeps
//! a journal of them.

use std::sync::{Arc, Mutex, PoisonError};

use keel_cluster::OfferRecommendation;
use keel_id::{OfferId, TaskId};
use serde::Serialize;
use tracing::info;

/// Calls the scheduler makes on the cluster manager. All calls are
/// fire-and-forget.
pub trait SchedulerDriver: Send + Sync {
    fn accept(&self, offer_id: OfferId, operations: &[OfferRecommendation]);

    fn decline(&self, offer_ids: &[OfferId]);

    fn kill(&self, task_id: &TaskId);

    /// Ask for offers again.
    fn revive(&self);

    /// Stop sending offers until revived.
    fn suppress(&self);
}

/// One call made through a [`RecordingDriver`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum DriverCall {
    Accept {
        offer_id: OfferId,
        operations: Vec<OfferRecommendation>,
    },
    Decline {
        offer_ids: Vec<OfferId>,
    },
    Kill {
        task_id: TaskId,
    },
    Revive,
    Suppress,
}

/// Driver that records calls instead of sending them anywhere.
#[derive(Debug, Default)]
pub struct RecordingDriver {
    journal: Mutex<Vec<DriverCall>>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: DriverCall) {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    /// Calls made so far.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drains the journal.
    pub fn take(&self) -> Vec<DriverCall> {
        std::mem::take(&mut *self.journal.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl SchedulerDriver for RecordingDriver {
    fn accept(&self, offer_id: OfferId, operations: &[OfferRecommendation]) {
        info!(offer_id = %offer_id, operations = operations.len(), "Accepting offer");
        self.record(DriverCall::Accept {
            offer_id,
            operations: operations.to_vec(),
        });
    }

    fn decline(&self, offer_ids: &[OfferId]) {
        if offer_ids.is_empty() {
            return;
        }
        info!(count = offer_ids.len(), "Declining unused offers");
        self.record(DriverCall::Decline {
            offer_ids: offer_ids.to_vec(),
        });
    }

    fn kill(&self, task_id: &TaskId) {
        info!(task_id = %task_id, "Killing task");
        self.record(DriverCall::Kill {
            task_id: task_id.clone(),
        });
    }

    fn revive(&self) {
        info!("Reviving offers");
        self.record(DriverCall::Revive);
    }

    fn suppress(&self) {
        info!("Suppressing offers");
        self.record(DriverCall::Suppress);
    }
}

/// Fire-and-forget task kills.
#[derive(Clone)]
pub struct TaskKiller {
    driver: Arc<dyn SchedulerDriver>,
}

impl TaskKiller {
    pub fn new(driver: Arc<dyn SchedulerDriver>) -> Self {
        Self { driver }
    }

    pub fn kill(&self, task_id: &TaskId) {
        self.driver.kill(task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal() {
        let driver = Arc::new(RecordingDriver::new());
        let killer = TaskKiller::new(driver.clone());
        let task_id = TaskId::new("node-0-server").unwrap();

        killer.kill(&task_id);
        driver.decline(&[]);
        driver.suppress();

        assert_eq!(
            driver.take(),
            vec![DriverCall::Kill { task_id }, DriverCall::Suppress]
        );
        assert!(driver.calls().is_empty());
    }
}

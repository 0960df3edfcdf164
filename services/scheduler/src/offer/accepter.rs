//! Sending operations to the cluster manager.

use std::sync::Arc;

use keel_cluster::OfferRecommendation;
use keel_id::OfferId;
use tracing::{error, instrument};

use super::OperationRecorder;
use crate::driver::SchedulerDriver;

/// Records operations, then accepts them offer by offer.
pub struct OfferAccepter {
    driver: Arc<dyn SchedulerDriver>,
    recorders: Vec<Arc<dyn OperationRecorder>>,
}

impl OfferAccepter {
    pub fn new(driver: Arc<dyn SchedulerDriver>, recorders: Vec<Arc<dyn OperationRecorder>>) -> Self {
        Self { driver, recorders }
    }

    /// Returns the IDs of the offers used. Transient operations are recorded
    /// but never sent.
    #[instrument(skip(self, recommendations), fields(count = recommendations.len()))]
    pub fn accept(&self, recommendations: &[OfferRecommendation]) -> Vec<OfferId> {
        for recommendation in recommendations {
            for recorder in &self.recorders {
                if let Err(e) = recorder.record(recommendation) {
                    error!(error = %e, offer_id = %recommendation.offer_id(), "Failed to record operation");
                }
            }
        }

        let mut offer_ids: Vec<OfferId> = Vec::new();
        for recommendation in recommendations {
            if !offer_ids.contains(&recommendation.offer_id()) {
                offer_ids.push(recommendation.offer_id());
            }
        }

        for offer_id in &offer_ids {
            let operations: Vec<OfferRecommendation> = recommendations
                .iter()
                .filter(|r| r.offer_id() == *offer_id && !r.is_transient())
                .cloned()
                .collect();
            if !operations.is_empty() {
                self.driver.accept(*offer_id, &operations);
            }
        }
        offer_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverCall, RecordingDriver};
    use crate::offer::PersistentLaunchRecorder;
    use crate::store::fixtures::task_info;
    use crate::store::{MemoryStateStore, StateStore};
    use keel_cluster::Resource;
    use keel_id::ResourceId;

    #[test]
    fn test_groups_by_offer_and_skips_transient() {
        let driver = Arc::new(RecordingDriver::new());
        let store = Arc::new(MemoryStateStore::new());
        let accepter = OfferAccepter::new(
            driver.clone(),
            vec![Arc::new(PersistentLaunchRecorder::new(store.clone())) as Arc<dyn OperationRecorder>],
        );

        let (a, b) = (OfferId::new(), OfferId::new());
        let launched = task_info("node", 0, "server");
        let idle = task_info("node", 0, "init");
        let recs = vec![
            OfferRecommendation::Reserve {
                offer_id: a,
                resource: Resource::reserved(ResourceId::new(), "cpus", 1.0),
            },
            OfferRecommendation::Launch {
                offer_id: b,
                task: Box::new(idle.clone()),
                transient: true,
            },
            OfferRecommendation::Launch {
                offer_id: a,
                task: Box::new(launched.clone()),
                transient: false,
            },
        ];

        assert_eq!(accepter.accept(&recs), vec![a, b]);

        let calls = driver.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            DriverCall::Accept { offer_id, operations } => {
                assert_eq!(*offer_id, a);
                assert_eq!(operations.len(), 2);
            }
            other => panic!("unexpected call {other:?}"),
        }

        assert!(store.fetch_task(&launched.name).unwrap().is_some());
        assert!(store.fetch_task(&idle.name).unwrap().is_some());
        assert!(store.fetch_status(&idle.name).unwrap().is_none());
    }
}

//! Releasing reservations nobody expects anymore.

use std::collections::HashSet;
use std::sync::Arc;

use keel_cluster::{Offer, OfferRecommendation};
use keel_id::ResourceId;
use tracing::info;

use crate::store::{GoalOverrideStatus, StateStore, StateStoreError};

/// Finds reserved resources in offers that no stored task claims.
///
/// Tasks being decommissioned no longer claim their resources.
pub struct ResourceCleaner {
    store: Arc<dyn StateStore>,
}

impl ResourceCleaner {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    fn expected_resources(&self) -> Result<HashSet<ResourceId>, StateStoreError> {
        let mut expected = HashSet::new();
        for task in self.store.fetch_tasks()? {
            if self.store.fetch_goal_override_status(&task.name)?
                == GoalOverrideStatus::DECOMMISSIONING
            {
                continue;
            }
            expected.extend(task.resources.iter().filter_map(|r| r.id));
        }
        Ok(expected)
    }

    /// Destroy and unreserve operations for unexpected reservations.
    pub fn evaluate(&self, offers: &[Offer]) -> Result<Vec<OfferRecommendation>, StateStoreError> {
        let expected = self.expected_resources()?;
        let mut recommendations = Vec::new();
        for offer in offers {
            for resource in offer.reserved() {
                let Some(id) = resource.id else {
                    continue;
                };
                if expected.contains(&id) {
                    continue;
                }
                info!(offer_id = %offer.id, resource_id = %id, "Releasing unexpected reservation");
                if resource.volume.is_some() {
                    recommendations.push(OfferRecommendation::DestroyVolume {
                        offer_id: offer.id,
                        resource: resource.clone(),
                    });
                }
                recommendations.push(OfferRecommendation::Unreserve {
                    offer_id: offer.id,
                    resource: resource.clone(),
                });
            }
        }
        Ok(recommendations)
    }
}

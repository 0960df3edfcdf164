//! Shrinking a service.
//!
//! Pods beyond their type's count, and pods whose type was removed from the
//! service spec, are decommissioned one at a time: their tasks are flagged and
//! killed, their reserved resources are released as they come back in offers,
//! and finally their records are erased. Until the resources are actually
//! released, raising the count again simply drops the pod from the plan.

mod factory;
mod pod_key;
mod steps;

pub use factory::{DecommissionPlanFactory, DECOMMISSION_PLAN_NAME};
pub use pod_key::PodKey;
pub use steps::{EraseTaskStateStep, ResourceCleanupStep, TriggerDecommissionStep};

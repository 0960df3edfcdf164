//! # keel-cluster
//!
//! The slice of the cluster manager's data model the scheduler works with.
//!
//! - [`Offer`]s advertise resources on one agent; reserved resources carry a
//!   [`ResourceId`](keel_id::ResourceId).
//! - [`TaskInfo`] is the scheduler's persisted record of a launched task.
//! - [`TaskStatus`] is what the cluster manager reports back.
//! - [`OfferRecommendation`] is an operation proposed against a single offer.

mod offer;
mod task;

pub use offer::*;
pub use task::*;

//! keel scheduler
//!
//! The plan execution and arbitration engine of a scheduler for stateful
//! services on an offer-based cluster manager.
//!
//! Work is described as plans (`deploy`, `recovery`, `decommission`), each a
//! tree of phases and steps whose progress is gated by strategies. For every
//! batch of offers the [`coordinator`] collects eligible steps across all
//! plans, making sure no two plans claim the same pod instance, and hands them
//! to the plan scheduler which turns them into offer operations.

pub mod api;
pub mod config;
pub mod coordinator;
pub mod decommission;
pub mod driver;
pub mod error;
pub mod offer;
pub mod plan;
pub mod recovery;
pub mod scheduler;
pub mod spec;
pub mod state;
pub mod store;
pub mod strategy;
pub mod worker;

pub use error::{PlanError, SchedulerError};
pub use scheduler::Scheduler;

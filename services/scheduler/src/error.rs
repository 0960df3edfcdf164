//! Engine error types.

use thiserror::Error;

use crate::spec::SpecError;
use crate::store::StateStoreError;

/// Errors raised while constructing plans and requirements.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("element '{0}' is already registered with this dependency graph")]
    DuplicateElement(String),

    #[error("dependency graph references unknown element '{0}'")]
    UnknownElement(String),

    #[error("invalid pod instance requirement: {0}")]
    InvalidRequirement(String),
}

/// Errors from the scheduler façade.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("state store error: {0}")]
    Store(#[from] StateStoreError),

    #[error("plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("service spec error: {0}")]
    Spec(#[from] SpecError),

    /// The framework identity could not be persisted. The process must exit.
    #[error("failed to persist framework registration: {0}")]
    Registration(#[source] StateStoreError),
}

impl SchedulerError {
    /// Errors after which the scheduler cannot keep running.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Registration(_))
    }
}

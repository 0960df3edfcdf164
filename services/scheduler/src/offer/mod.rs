//! Turning requirements and leftover reservations into offer operations.

mod accepter;
mod cleaner;
mod evaluator;
mod recorder;

use thiserror::Error;

use crate::store::StateStoreError;

pub use accepter::OfferAccepter;
pub use cleaner::ResourceCleaner;
pub use evaluator::{OfferEvaluator, ScalarOfferEvaluator};
pub use recorder::{DecommissionRecorder, OperationRecorder, PersistentLaunchRecorder};

#[derive(Debug, Error)]
pub enum OfferError {
    #[error("state store error: {0}")]
    Store(#[from] StateStoreError),

    #[error("no target configuration has been stored")]
    NoTargetConfig,

    #[error("task {0} is not defined in its pod")]
    UnknownTask(String),
}

//! # keel-id
//!
//! Typed identifiers for the keel scheduler.
//!
//! Plans, phases, steps, offers and agents are identified by a prefixed ULID:
//! `{prefix}_{ulid}`, for example `step_01HV4Z2WQXKJNM8GPQY6VBKC3D`.
//!
//! Task IDs are different: the cluster manager reports status by task ID only,
//! so a [`TaskId`] embeds the task name it was launched for
//! (`{task_name}__{ulid}`). The name survives relaunches while the ULID part
//! changes, which is what lets the scheduler tell a stale status apart from a
//! current one.

mod error;
mod macros;
mod task;
mod types;

pub use error::IdError;
pub use task::TaskId;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;

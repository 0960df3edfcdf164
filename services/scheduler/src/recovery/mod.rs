//! Turning task failures into recovery work.

mod constrainer;
mod manager;
mod monitor;

pub use constrainer::{LaunchConstrainer, TimedLaunchConstrainer, UnconstrainedLaunchConstrainer};
pub use manager::{RecoveryPlanManager, RECOVERY_PLAN_NAME};
pub use monitor::{
    CountingFailureMonitor, FailureMonitor, NeverFailureMonitor, TimedFailureMonitor,
};

//! Rate limiting for recovery launches.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::plan::RecoveryType;

/// Decides whether a recovery launch may happen this cycle, independent of
/// resource availability.
pub trait LaunchConstrainer: Send + Sync {
    /// Records that a launch of the given kind was accepted.
    fn launch_happened(&self, recovery_type: RecoveryType);

    fn can_launch(&self, recovery_type: RecoveryType) -> bool;
}

/// Never holds back a launch.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconstrainedLaunchConstrainer;

impl LaunchConstrainer for UnconstrainedLaunchConstrainer {
    fn launch_happened(&self, _recovery_type: RecoveryType) {}

    fn can_launch(&self, _recovery_type: RecoveryType) -> bool {
        true
    }
}

/// Enforces a minimum delay between permanent recoveries.
///
/// Permanent recovery gives up reserved resources, so a flapping task must not
/// be allowed to trigger it back to back.
#[derive(Debug)]
pub struct TimedLaunchConstrainer {
    min_delay: Duration,
    last_permanent: Mutex<Option<Instant>>,
}

impl TimedLaunchConstrainer {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_permanent: Mutex::new(None),
        }
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }
}

impl LaunchConstrainer for TimedLaunchConstrainer {
    fn launch_happened(&self, recovery_type: RecoveryType) {
        if recovery_type != RecoveryType::Permanent {
            return;
        }
        info!(
            min_delay_secs = self.min_delay.as_secs(),
            "Permanent recovery launched, delaying further permanent recoveries"
        );
        *self
            .last_permanent
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    fn can_launch(&self, recovery_type: RecoveryType) -> bool {
        if recovery_type != RecoveryType::Permanent {
            return true;
        }
        let last = *self
            .last_permanent
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match last {
            Some(at) => {
                let elapsed = at.elapsed();
                if elapsed < self.min_delay {
                    debug!(
                        remaining_secs = (self.min_delay - elapsed).as_secs(),
                        "Permanent recovery held back"
                    );
                    return false;
                }
                true
            }
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconstrained() {
        let c = UnconstrainedLaunchConstrainer;
        c.launch_happened(RecoveryType::Permanent);
        assert!(c.can_launch(RecoveryType::Permanent));
    }

    #[test]
    fn test_timed_blocks_permanent_only() {
        let c = TimedLaunchConstrainer::new(Duration::from_secs(600));
        assert!(c.can_launch(RecoveryType::Permanent));

        c.launch_happened(RecoveryType::Transient);
        assert!(c.can_launch(RecoveryType::Permanent));

        c.launch_happened(RecoveryType::Permanent);
        assert!(!c.can_launch(RecoveryType::Permanent));
        assert!(c.can_launch(RecoveryType::Transient));
        assert!(c.can_launch(RecoveryType::None));
    }

    #[test]
    fn test_timed_releases_after_delay() {
        let c = TimedLaunchConstrainer::new(Duration::from_millis(20));
        c.launch_happened(RecoveryType::Permanent);
        assert!(!c.can_launch(RecoveryType::Permanent));
        std::thread::sleep(Duration::from_millis(40));
        assert!(c.can_launch(RecoveryType::Permanent));
    }
}

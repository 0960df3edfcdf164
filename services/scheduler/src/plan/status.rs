//! Element status.

use serde::{Deserialize, Serialize};

/// Progress of a plan element.
///
/// Variants are ordered from least to most progressed; a step tracking
/// several tasks reports the least progressed of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Error,
    Waiting,
    Pending,
    Prepared,
    Starting,
    InProgress,
    Complete,
}

impl Status {
    pub fn is_complete(&self) -> bool {
        *self == Self::Complete
    }

    /// Work has been handed out and is not finished yet.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Prepared | Self::Starting | Self::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Waiting => "WAITING",
            Self::Pending => "PENDING",
            Self::Prepared => "PREPARED",
            Self::Starting => "STARTING",
            Self::InProgress => "IN_PROGRESS",
            Self::Complete => "COMPLETE",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_least_progressed_wins() {
        let tasks = [Status::Complete, Status::Starting, Status::InProgress];
        assert_eq!(tasks.iter().min(), Some(&Status::Starting));
        assert!(Status::Pending < Status::Prepared);
    }

    #[test]
    fn test_running() {
        assert!(Status::Prepared.is_running());
        assert!(Status::InProgress.is_running());
        assert!(!Status::Pending.is_running());
        assert!(!Status::Complete.is_running());
    }
}

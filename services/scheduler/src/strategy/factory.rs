//! Strategy lookup by name.

use tracing::warn;

use super::{CanaryStrategy, ParallelStrategy, RandomStrategy, SerialStrategy, Strategy};
use crate::plan::Element;

/// Builds a fresh strategy instance for one element from its configured name.
pub struct StrategyFactory;

impl StrategyFactory {
    pub const SERIAL: &'static str = "serial";
    pub const PARALLEL: &'static str = "parallel";
    pub const RANDOM: &'static str = "random";
    pub const SERIAL_CANARY: &'static str = "serial-canary";
    pub const PARALLEL_CANARY: &'static str = "parallel-canary";
    pub const SERIAL_SAFE: &'static str = "serial-safe";
    pub const PARALLEL_SAFE: &'static str = "parallel-safe";

    /// Unknown names fall back to serial.
    pub fn generate<E: Element + ?Sized + 'static>(name: Option<&str>) -> Box<dyn Strategy<E>> {
        match name.unwrap_or(Self::SERIAL) {
            Self::SERIAL => Box::new(SerialStrategy::new()),
            Self::PARALLEL => Box::new(ParallelStrategy::new()),
            Self::RANDOM => Box::new(RandomStrategy::new()),
            Self::SERIAL_CANARY => Box::new(CanaryStrategy::new(Box::new(SerialStrategy::new()))),
            Self::PARALLEL_CANARY => {
                Box::new(CanaryStrategy::new(Box::new(ParallelStrategy::new())))
            }
            Self::SERIAL_SAFE => Box::new(CanaryStrategy::safe(Box::new(SerialStrategy::new()))),
            Self::PARALLEL_SAFE => Box::new(CanaryStrategy::safe(Box::new(ParallelStrategy::new()))),
            unknown => {
                warn!(strategy = unknown, "Unknown strategy, falling back to serial");
                Box::new(SerialStrategy::new())
            }
        }
    }
}

//! Strategies decide which children of a phase or plan may act next.
//!
//! A strategy instance belongs to exactly one parent element and may keep
//! state across calls (interruption, lazily built dependency graphs, canary
//! slots). Children are always passed in declaration order and addressed by
//! their index in that list.

mod canary;
mod dependency;
mod factory;
mod helper;
mod parallel;
mod random;
mod serial;
mod terminal;

use std::collections::HashSet;

use tracing::debug;

use crate::plan::Element;

pub use canary::CanaryStrategy;
pub use dependency::DependencyStrategy;
pub use factory::StrategyFactory;
pub use helper::DependencyStrategyHelper;
pub use parallel::ParallelStrategy;
pub use random::RandomStrategy;
pub use serial::SerialStrategy;
pub use terminal::{TerminalMode, TerminalStrategy};

/// Selection policy over the children of one element.
pub trait Strategy<E: Element + ?Sized>: Send {
    /// Indices of the children eligible to act now.
    fn candidates(&mut self, children: &[&E], dirty_assets: &HashSet<String>) -> Vec<usize>;

    fn interrupt(&mut self);

    fn proceed(&mut self);

    fn is_interrupted(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Interrupted flag shared by every strategy.
#[derive(Debug, Default, Clone)]
pub struct Interruptible {
    interrupted: bool,
}

impl Interruptible {
    pub fn interrupt(&mut self) {
        if !self.interrupted {
            debug!("Strategy interrupted");
        }
        self.interrupted = true;
    }

    pub fn proceed(&mut self) {
        if self.interrupted {
            debug!("Strategy proceeding");
        }
        self.interrupted = false;
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }
}

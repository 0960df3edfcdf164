//! Manual gating in front of another strategy.

use std::collections::HashSet;

use tracing::{info, warn};

use super::Strategy;
use crate::plan::{is_eligible, Element, Status};

/// Default number of children that need an operator `proceed()`.
pub const DEFAULT_REQUIRED_PROCEEDS: usize = 2;

#[derive(Debug, Clone, Copy)]
struct Slot {
    child: usize,
    proceed_needed: bool,
    /// Child seen complete on the last call.
    done: bool,
}

/// Holds back the first children until an operator releases them one
/// `proceed()` at a time, then hands over to a delegate strategy.
///
/// Slots are taken from the children that are pending or waiting on the
/// first call. Released slots run in order before the delegate takes over.
pub struct CanaryStrategy<E: ?Sized> {
    delegate: Box<dyn Strategy<E>>,
    /// `None` gates every child that is pending on the first call.
    required_proceeds: Option<usize>,
    slots: Option<Vec<Slot>>,
}

impl<E: Element + ?Sized> CanaryStrategy<E> {
    pub fn new(delegate: Box<dyn Strategy<E>>) -> Self {
        Self::with_required_proceeds(delegate, DEFAULT_REQUIRED_PROCEEDS)
    }

    pub fn with_required_proceeds(delegate: Box<dyn Strategy<E>>, required_proceeds: usize) -> Self {
        Self {
            delegate,
            required_proceeds: Some(required_proceeds),
            slots: None,
        }
    }

    /// Every pending child needs its own `proceed()`.
    pub fn safe(delegate: Box<dyn Strategy<E>>) -> Self {
        Self {
            delegate,
            required_proceeds: None,
            slots: None,
        }
    }

    fn next_gated_slot(&mut self) -> Option<&mut Slot> {
        self.slots
            .as_mut()
            .and_then(|slots| slots.iter_mut().find(|s| s.proceed_needed))
    }

    fn has_gated_slot(&self) -> bool {
        self.slots
            .as_ref()
            .is_some_and(|slots| slots.iter().any(|s| s.proceed_needed))
    }
}

impl<E: Element + ?Sized> Strategy<E> for CanaryStrategy<E> {
    fn candidates(&mut self, children: &[&E], dirty_assets: &HashSet<String>) -> Vec<usize> {
        let limit = self.required_proceeds.unwrap_or(usize::MAX);
        let slots = self.slots.get_or_insert_with(|| {
            children
                .iter()
                .enumerate()
                .filter(|(_, c)| matches!(c.status(), Status::Pending | Status::Waiting))
                .take(limit)
                .map(|(child, _)| Slot {
                    child,
                    proceed_needed: true,
                    done: false,
                })
                .collect()
        });

        for slot in slots.iter_mut() {
            let Some(child) = children.get(slot.child) else {
                continue;
            };
            slot.done = child.is_complete();
            if slot.done {
                continue;
            }
            if slot.proceed_needed {
                return Vec::new();
            }
            if is_eligible(*child, dirty_assets) {
                return vec![slot.child];
            }
        }

        self.delegate.candidates(children, dirty_assets)
    }

    fn interrupt(&mut self) {
        if self.slots.is_none() {
            warn!("Interrupt has no effect before the canary has initialized");
        } else if self.has_gated_slot() {
            warn!("Interrupt has no effect while canary slots are waiting for proceed");
        } else {
            self.delegate.interrupt();
        }
    }

    fn proceed(&mut self) {
        if self.slots.is_none() {
            warn!("Proceed has no effect before the canary has initialized");
            return;
        }
        match self.next_gated_slot() {
            Some(slot) => {
                slot.proceed_needed = false;
                info!(child = slot.child, "Released canary slot");
            }
            None => self.delegate.proceed(),
        }
    }

    /// Interrupted while the next canary to run still needs a proceed.
    fn is_interrupted(&self) -> bool {
        let blocked = self.slots.as_ref().is_some_and(|slots| {
            slots
                .iter()
                .find(|s| !s.done)
                .is_some_and(|s| s.proceed_needed)
        });
        blocked || self.delegate.is_interrupted()
    }

    fn name(&self) -> &'static str {
        match self.required_proceeds {
            Some(_) => "canary",
            None => "safe",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::element::fake::{elements, refs, FakeElement};
    use crate::strategy::{ParallelStrategy, SerialStrategy};

    fn serial_canary() -> Box<dyn Strategy<FakeElement>> {
        Box::new(CanaryStrategy::new(Box::new(SerialStrategy::new())))
    }

    #[test]
    fn test_canary_gating() {
        let mut children = elements(&["step0", "step1", "step2"]);
        let mut strategy = serial_canary();
        let dirty = HashSet::new();

        assert!(strategy.candidates(&refs(&children), &dirty).is_empty());
        assert!(strategy.is_interrupted());

        strategy.proceed();
        assert!(!strategy.is_interrupted());
        assert_eq!(strategy.candidates(&refs(&children), &dirty), vec![0]);

        children[0].status = Status::Complete;
        assert!(strategy.candidates(&refs(&children), &dirty).is_empty());
        assert!(strategy.is_interrupted());

        strategy.proceed();
        assert_eq!(strategy.candidates(&refs(&children), &dirty), vec![1]);

        // The third step needs no proceed.
        children[1].status = Status::Complete;
        assert_eq!(strategy.candidates(&refs(&children), &dirty), vec![2]);
        assert!(!strategy.is_interrupted());
    }

    #[test]
    fn test_released_canary_respects_dirty_assets() {
        let children = elements(&["step0", "step1"]);
        let mut strategy = serial_canary();
        strategy.candidates(&refs(&children), &HashSet::new());
        strategy.proceed();

        let dirty: HashSet<String> = ["step0".to_string()].into();
        assert!(strategy.candidates(&refs(&children), &dirty).is_empty());
    }

    #[test]
    fn test_parallel_canary_opens_floodgates() {
        let mut children = elements(&["s0", "s1", "s2", "s3"]);
        let mut strategy: Box<dyn Strategy<FakeElement>> =
            Box::new(CanaryStrategy::new(Box::new(ParallelStrategy::new())));
        let dirty = HashSet::new();

        assert!(strategy.candidates(&refs(&children), &dirty).is_empty());
        strategy.proceed();
        strategy.proceed();
        assert_eq!(strategy.candidates(&refs(&children), &dirty), vec![0]);
        children[0].status = Status::Complete;
        assert_eq!(strategy.candidates(&refs(&children), &dirty), vec![1]);
        children[1].status = Status::Complete;
        assert_eq!(strategy.candidates(&refs(&children), &dirty), vec![2, 3]);
    }

    #[test]
    fn test_interrupt_ignored_while_gated() {
        let children = elements(&["s0", "s1", "s2"]);
        let mut strategy = serial_canary();
        strategy.candidates(&refs(&children), &HashSet::new());

        strategy.interrupt();
        strategy.proceed();
        strategy.proceed();
        assert_eq!(strategy.candidates(&refs(&children), &HashSet::new()), vec![0]);

        // All slots released: interrupts now reach the delegate.
        strategy.interrupt();
        assert!(strategy.is_interrupted());
        strategy.proceed();
        assert!(!strategy.is_interrupted());
    }

    #[test]
    fn test_proceed_before_initialization_is_ignored() {
        let children = elements(&["s0", "s1"]);
        let mut strategy = serial_canary();
        strategy.proceed();
        assert!(strategy.candidates(&refs(&children), &HashSet::new()).is_empty());
    }

    #[test]
    fn test_safe_gates_every_pending_child() {
        let mut children = elements(&["s0", "s1", "s2"]);
        children[0].status = Status::Complete;
        let mut strategy: Box<dyn Strategy<FakeElement>> =
            Box::new(CanaryStrategy::safe(Box::new(SerialStrategy::new())));
        let dirty = HashSet::new();

        assert!(strategy.candidates(&refs(&children), &dirty).is_empty());
        strategy.proceed();
        assert_eq!(strategy.candidates(&refs(&children), &dirty), vec![1]);
        children[1].status = Status::Complete;
        assert!(strategy.candidates(&refs(&children), &dirty).is_empty());
        strategy.proceed();
        assert_eq!(strategy.candidates(&refs(&children), &dirty), vec![2]);
        assert_eq!(strategy.name(), "safe");
    }
}

//! A designated child that runs only after the rest.

use std::collections::HashSet;

use tracing::warn;

use super::{DependencyStrategyHelper, Interruptible, Strategy};
use crate::plan::{is_eligible, Element};

/// How the non-terminal children are ordered among themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalMode {
    /// Other children run together; the terminal child waits for all of them.
    Parallel,
    /// Other children run one by one; the terminal child follows the last.
    Serial,
}

#[derive(Debug)]
pub struct TerminalStrategy {
    interruptible: Interruptible,
    terminal: String,
    mode: TerminalMode,
    helper: Option<DependencyStrategyHelper<usize>>,
}

impl TerminalStrategy {
    pub fn new(terminal: impl Into<String>, mode: TerminalMode) -> Self {
        Self {
            interruptible: Interruptible::default(),
            terminal: terminal.into(),
            mode,
            helper: None,
        }
    }

    fn build<E: Element + ?Sized>(&self, children: &[&E]) -> DependencyStrategyHelper<usize> {
        let terminal = children.iter().position(|c| c.name() == self.terminal);
        if terminal.is_none() {
            warn!(terminal = %self.terminal, "Terminal element is not among the children");
        }
        let others: Vec<usize> = (0..children.len()).filter(|i| Some(*i) != terminal).collect();

        let mut helper = DependencyStrategyHelper::new();
        match self.mode {
            TerminalMode::Parallel => others.iter().for_each(|i| helper.insert(i)),
            TerminalMode::Serial => {
                if let Some(first) = others.first() {
                    helper.insert(first);
                }
                for pair in others.windows(2) {
                    helper.link(pair[1], pair[0]);
                }
            }
        }
        if let Some(t) = terminal {
            helper.insert(&t);
            match self.mode {
                TerminalMode::Parallel => {
                    for other in &others {
                        helper.link(t, *other);
                    }
                }
                TerminalMode::Serial => {
                    if let Some(last) = others.last() {
                        helper.link(t, *last);
                    }
                }
            }
        }
        helper
    }
}

impl<E: Element + ?Sized> Strategy<E> for TerminalStrategy {
    fn candidates(&mut self, children: &[&E], dirty_assets: &HashSet<String>) -> Vec<usize> {
        if self.interruptible.is_interrupted() {
            return Vec::new();
        }
        if self.helper.is_none() {
            self.helper = Some(self.build(children));
        }
        let Some(helper) = self.helper.as_ref() else {
            return Vec::new();
        };
        let mut candidates = helper.candidates(
            |&i| is_eligible(children[i], dirty_assets),
            |&i| children[i].is_complete(),
        );
        if self.mode == TerminalMode::Serial {
            candidates.truncate(1);
        }
        candidates
    }

    fn interrupt(&mut self) {
        self.interruptible.interrupt();
    }

    fn proceed(&mut self) {
        self.interruptible.proceed();
    }

    fn is_interrupted(&self) -> bool {
        self.interruptible.is_interrupted()
    }

    fn name(&self) -> &'static str {
        "terminal"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::element::fake::{elements, refs, FakeElement};
    use crate::plan::Status;

    #[test]
    fn test_parallel_terminal_waits_for_all() {
        let mut children = elements(&["a", "done", "b"]);
        let mut strategy: Box<dyn Strategy<FakeElement>> =
            Box::new(TerminalStrategy::new("done", TerminalMode::Parallel));
        let dirty = HashSet::new();

        assert_eq!(strategy.candidates(&refs(&children), &dirty), vec![0, 2]);

        children[0].status = Status::Complete;
        assert_eq!(strategy.candidates(&refs(&children), &dirty), vec![2]);

        children[2].status = Status::Complete;
        assert_eq!(strategy.candidates(&refs(&children), &dirty), vec![1]);
    }

    #[test]
    fn test_serial_terminal_follows_last() {
        let mut children = elements(&["a", "b", "done"]);
        let mut strategy: Box<dyn Strategy<FakeElement>> =
            Box::new(TerminalStrategy::new("done", TerminalMode::Serial));
        let dirty = HashSet::new();

        assert_eq!(strategy.candidates(&refs(&children), &dirty), vec![0]);
        children[0].status = Status::Complete;
        assert_eq!(strategy.candidates(&refs(&children), &dirty), vec![1]);
        children[1].status = Status::Complete;
        assert_eq!(strategy.candidates(&refs(&children), &dirty), vec![2]);
    }

    #[test]
    fn test_missing_terminal_degrades_to_mode() {
        let children = elements(&["a", "b"]);
        let mut strategy: Box<dyn Strategy<FakeElement>> =
            Box::new(TerminalStrategy::new("done", TerminalMode::Parallel));
        assert_eq!(strategy.candidates(&refs(&children), &HashSet::new()), vec![0, 1]);
    }
}

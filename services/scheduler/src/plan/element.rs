//! Behaviour shared by steps, phases and plans.

use std::collections::HashSet;

use tracing::{debug, warn};

use super::Status;

/// A node of the plan tree as seen by strategies.
pub trait Element {
    fn name(&self) -> &str;

    fn status(&self) -> Status;

    /// Errors attached to this element itself.
    fn errors(&self) -> &[String];

    /// Interruption is held by the element's strategy for phases and plans.
    fn is_interrupted(&self) -> bool;

    /// Pod instance this element acts on. Only steps have one.
    fn asset(&self) -> Option<&str> {
        None
    }

    fn is_complete(&self) -> bool {
        self.status().is_complete()
    }

    fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }
}

/// An element may be handed work when it is not interrupted, its asset is
/// not already claimed, and it is neither complete nor in error.
pub fn is_eligible<E: Element + ?Sized>(element: &E, dirty_assets: &HashSet<String>) -> bool {
    if element.is_interrupted() {
        return false;
    }
    if let Some(asset) = element.asset() {
        if dirty_assets.contains(asset) {
            return false;
        }
    }
    !element.is_complete() && !element.has_errors()
}

/// Status of a parent element derived from its children.
///
/// The order of the checks matters.
pub fn aggregate_status<E: Element + ?Sized>(
    name: &str,
    errors: &[String],
    interrupted: bool,
    children: &[&E],
) -> Status {
    let all = |status: Status| children.iter().all(|c| c.status() == status);
    let any = |status: Status| children.iter().any(|c| c.status() == status);

    if !errors.is_empty() {
        Status::Error
    } else if children.is_empty() || all(Status::Complete) {
        Status::Complete
    } else if interrupted || any(Status::Waiting) {
        Status::Waiting
    } else if all(Status::Pending) {
        Status::Pending
    } else if any(Status::Prepared) || any(Status::Starting) || any(Status::InProgress) {
        Status::InProgress
    } else if any(Status::Complete) && any(Status::Pending) {
        Status::InProgress
    } else {
        let statuses: Vec<Status> = children.iter().map(|c| c.status()).collect();
        warn!(element = name, ?statuses, "Unexpected combination of child statuses");
        debug!(element = name, "Reporting ERROR for unexpected child statuses");
        Status::Error
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    /// Minimal element used by strategy tests.
    #[derive(Debug, Clone)]
    pub struct FakeElement {
        pub name: String,
        pub status: Status,
        pub interrupted: bool,
        pub errors: Vec<String>,
        pub asset: Option<String>,
    }

    impl FakeElement {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                status: Status::Pending,
                interrupted: false,
                errors: Vec::new(),
                asset: Some(name.to_string()),
            }
        }

        pub fn with_status(mut self, status: Status) -> Self {
            self.status = status;
            self
        }
    }

    impl Element for FakeElement {
        fn name(&self) -> &str {
            &self.name
        }

        fn status(&self) -> Status {
            self.status
        }

        fn errors(&self) -> &[String] {
            &self.errors
        }

        fn is_interrupted(&self) -> bool {
            self.interrupted
        }

        fn asset(&self) -> Option<&str> {
            self.asset.as_deref()
        }
    }

    pub fn elements(names: &[&str]) -> Vec<FakeElement> {
        names.iter().map(|n| FakeElement::new(n)).collect()
    }

    pub fn refs(elements: &[FakeElement]) -> Vec<&FakeElement> {
        elements.iter().collect()
    }
}

//! Leaf elements of the plan tree.

use std::collections::{BTreeMap, HashSet};

use keel_cluster::{OfferRecommendation, TaskStatus};
use keel_id::{ResourceId, StepId};

use super::{Element, PodInstanceRequirement, Status};

/// State every step carries.
#[derive(Debug, Clone)]
pub struct StepBase {
    pub id: StepId,
    pub name: String,
    pub status: Status,
    pub interrupted: bool,
    pub errors: Vec<String>,
    pub asset: Option<String>,
    pub parameters: BTreeMap<String, String>,
}

impl StepBase {
    pub fn new(name: impl Into<String>, status: Status, asset: Option<String>) -> Self {
        Self {
            id: StepId::new(),
            name: name.into(),
            status,
            interrupted: false,
            errors: Vec::new(),
            asset,
            parameters: BTreeMap::new(),
        }
    }

    /// Reported status; an interrupted pending step is waiting.
    pub fn display_status(&self) -> Status {
        if self.interrupted && self.status == Status::Pending {
            Status::Waiting
        } else {
            self.status
        }
    }
}

/// A unit of work acting on at most one pod instance.
pub trait Step: Element + Send {
    fn base(&self) -> &StepBase;

    fn base_mut(&mut self) -> &mut StepBase;

    fn id(&self) -> StepId {
        self.base().id
    }

    /// Begins work. Returns the requirement to match against offers, or
    /// nothing when this step has no offers to claim.
    fn start(&mut self) -> Option<PodInstanceRequirement>;

    /// Reports the operations produced for the requirement from [`Step::start`].
    fn update_offer_status(&mut self, recommendations: &[OfferRecommendation]);

    /// Feeds a task status from the cluster manager.
    fn update(&mut self, status: &TaskStatus);

    /// Reports reserved resources released by the cleanup pass.
    fn update_resources(&mut self, _released: &HashSet<ResourceId>) {}

    /// The requirement this step is working on, if any.
    fn requirement(&self) -> Option<&PodInstanceRequirement> {
        None
    }

    /// Human readable progress line.
    fn message(&self) -> String {
        format!("step '{}' has status {}", self.name(), self.status())
    }

    fn restart(&mut self) {
        let base = self.base_mut();
        base.status = Status::Pending;
        base.errors.clear();
    }

    fn force_complete(&mut self) {
        self.base_mut().status = Status::Complete;
    }

    fn interrupt(&mut self) {
        self.base_mut().interrupted = true;
    }

    fn proceed(&mut self) {
        self.base_mut().interrupted = false;
    }

    fn update_parameters(&mut self, parameters: &BTreeMap<String, String>) {
        self.base_mut().parameters.extend(parameters.clone());
    }
}

/// Implements [`Element`] for a step type by reading its [`StepBase`].
#[macro_export]
macro_rules! step_element {
    ($ty:ty) => {
        impl $crate::plan::Element for $ty {
            fn name(&self) -> &str {
                &$crate::plan::Step::base(self).name
            }

            fn status(&self) -> $crate::plan::Status {
                $crate::plan::Step::base(self).display_status()
            }

            fn errors(&self) -> &[String] {
                &$crate::plan::Step::base(self).errors
            }

            fn is_interrupted(&self) -> bool {
                $crate::plan::Step::base(self).interrupted
            }

            fn asset(&self) -> Option<&str> {
                $crate::plan::Step::base(self).asset.as_deref()
            }
        }
    };
}

//! The plan tree: plans own phases, phases own steps.

mod deployment;
pub(crate) mod element;
mod factory;
mod info;
mod manager;
mod requirement;
mod status;
mod step;
mod tree;

pub use deployment::DeploymentStep;
pub use element::{aggregate_status, is_eligible, Element};
pub use factory::{DeployPlanFactory, DEPLOY_PLAN_NAME};
pub use info::{PhaseInfo, PlanInfo, StepInfo};
pub use manager::{DefaultPlanManager, PlanManager};
pub use requirement::{PodInstance, PodInstanceRequirement, RecoveryType};
pub use status::Status;
pub use step::{Step, StepBase};
pub use tree::{Phase, Plan, StepAddr};

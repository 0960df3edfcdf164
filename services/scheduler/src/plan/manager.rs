//! Ownership of a single plan.

use std::collections::HashSet;

use keel_cluster::TaskStatus;

use super::{Element, Plan, StepAddr};

/// Owns one plan and answers the coordinator's questions about it.
pub trait PlanManager: Send {
    fn plan(&self) -> &Plan;

    fn plan_mut(&mut self) -> &mut Plan;

    /// Steps of this plan eligible to act, skipping claimed assets.
    fn candidates(&mut self, dirty_assets: &HashSet<String>) -> Vec<StepAddr> {
        self.plan_mut().candidates(dirty_assets)
    }

    fn update(&mut self, status: &TaskStatus) {
        self.plan_mut().update(status);
    }

    /// Assets of steps that currently hold work.
    fn dirty_assets(&self) -> HashSet<String> {
        self.plan().dirty_assets()
    }

    fn name(&self) -> &str {
        self.plan().name()
    }
}

/// Plan manager for plans that need no special handling.
pub struct DefaultPlanManager {
    plan: Plan,
}

impl DefaultPlanManager {
    pub fn new(plan: Plan) -> Self {
        Self { plan }
    }
}

impl PlanManager for DefaultPlanManager {
    fn plan(&self) -> &Plan {
        &self.plan
    }

    fn plan_mut(&mut self) -> &mut Plan {
        &mut self.plan
    }
}

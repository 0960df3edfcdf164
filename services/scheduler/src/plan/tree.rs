//! Phases and plans.

use std::collections::{BTreeMap, HashSet};

use keel_cluster::TaskStatus;
use keel_id::{PhaseId, PlanId, ResourceId};
use tracing::{debug, info};

use super::{aggregate_status, Element, Status, Step};
use crate::strategy::{SerialStrategy, Strategy};

/// Location of a step inside a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepAddr {
    pub phase: usize,
    pub step: usize,
}

/// An ordered group of steps under one strategy.
pub struct Phase {
    id: PhaseId,
    name: String,
    steps: Vec<Box<dyn Step>>,
    strategy: Box<dyn Strategy<dyn Step>>,
    errors: Vec<String>,
}

impl Phase {
    pub fn new(
        name: impl Into<String>,
        steps: Vec<Box<dyn Step>>,
        strategy: Box<dyn Strategy<dyn Step>>,
    ) -> Self {
        Self {
            id: PhaseId::new(),
            name: name.into(),
            steps,
            strategy,
            errors: Vec::new(),
        }
    }

    pub fn id(&self) -> PhaseId {
        self.id
    }

    pub fn steps(&self) -> &[Box<dyn Step>] {
        &self.steps
    }

    pub fn steps_mut(&mut self) -> &mut [Box<dyn Step>] {
        &mut self.steps
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Indices of the steps eligible to act now.
    pub fn candidates(&mut self, dirty_assets: &HashSet<String>) -> Vec<usize> {
        let children: Vec<&dyn Step> = self.steps.iter().map(|s| s.as_ref()).collect();
        self.strategy.candidates(&children, dirty_assets)
    }

    pub fn update(&mut self, status: &TaskStatus) {
        self.steps.iter_mut().for_each(|s| s.update(status));
    }

    pub fn update_resources(&mut self, released: &HashSet<ResourceId>) {
        self.steps.iter_mut().for_each(|s| s.update_resources(released));
    }

    pub fn update_parameters(&mut self, parameters: &BTreeMap<String, String>) {
        self.steps
            .iter_mut()
            .for_each(|s| s.update_parameters(parameters));
    }

    pub fn restart(&mut self) {
        debug!(phase = %self.name, "Restarting steps");
        self.steps.iter_mut().for_each(|s| s.restart());
    }

    pub fn force_complete(&mut self) {
        debug!(phase = %self.name, "Forcing completion of steps");
        self.steps.iter_mut().for_each(|s| s.force_complete());
    }

    pub fn interrupt(&mut self) {
        self.strategy.interrupt();
    }

    pub fn proceed(&mut self) {
        self.strategy.proceed();
    }

    /// Finds steps by ID or name.
    pub fn find_steps(&self, id_or_name: &str) -> Vec<usize> {
        self.steps
            .iter()
            .enumerate()
            .filter(|(_, s)| s.id().to_string() == id_or_name || s.name() == id_or_name)
            .map(|(i, _)| i)
            .collect()
    }

    /// Errors of this phase and all of its steps.
    pub fn all_errors(&self) -> Vec<String> {
        let mut errors = self.errors.clone();
        for step in &self.steps {
            errors.extend(step.errors().iter().cloned());
        }
        errors
    }
}

impl Element for Phase {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> Status {
        let children: Vec<&dyn Step> = self.steps.iter().map(|s| s.as_ref()).collect();
        aggregate_status(
            &self.name,
            &self.errors,
            self.strategy.is_interrupted(),
            &children,
        )
    }

    fn errors(&self) -> &[String] {
        &self.errors
    }

    fn is_interrupted(&self) -> bool {
        self.strategy.is_interrupted()
    }
}

/// Root of a plan tree.
pub struct Plan {
    id: PlanId,
    name: String,
    phases: Vec<Phase>,
    strategy: Box<dyn Strategy<Phase>>,
    errors: Vec<String>,
}

impl Plan {
    pub fn new(
        name: impl Into<String>,
        phases: Vec<Phase>,
        strategy: Box<dyn Strategy<Phase>>,
    ) -> Self {
        Self {
            id: PlanId::new(),
            name: name.into(),
            phases,
            strategy,
            errors: Vec::new(),
        }
    }

    /// A plan whose phases run serially.
    pub fn serial(name: impl Into<String>, phases: Vec<Phase>) -> Self {
        Self::new(name, phases, Box::new(SerialStrategy::new()))
    }

    /// A plan that cannot run, carrying construction errors.
    #[must_use]
    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    pub fn id(&self) -> PlanId {
        self.id
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn phases_mut(&mut self) -> &mut [Phase] {
        &mut self.phases
    }

    /// Swaps in a new set of phases, keeping the plan's strategy state.
    pub fn replace_phases(&mut self, phases: Vec<Phase>) -> Vec<Phase> {
        std::mem::replace(&mut self.phases, phases)
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn step(&self, addr: StepAddr) -> Option<&dyn Step> {
        self.phases
            .get(addr.phase)
            .and_then(|p| p.steps.get(addr.step))
            .map(|s| s.as_ref())
    }

    pub fn step_mut(&mut self, addr: StepAddr) -> Option<&mut Box<dyn Step>> {
        self.phases
            .get_mut(addr.phase)
            .and_then(|p| p.steps.get_mut(addr.step))
    }

    pub fn steps(&self) -> impl Iterator<Item = (StepAddr, &dyn Step)> {
        self.phases.iter().enumerate().flat_map(|(pi, phase)| {
            phase.steps.iter().enumerate().map(move |(si, step)| {
                (
                    StepAddr {
                        phase: pi,
                        step: si,
                    },
                    step.as_ref(),
                )
            })
        })
    }

    /// Eligible steps: the plan strategy picks phases, each picked phase's
    /// strategy picks steps.
    pub fn candidates(&mut self, dirty_assets: &HashSet<String>) -> Vec<StepAddr> {
        let children: Vec<&Phase> = self.phases.iter().collect();
        let phases = self.strategy.candidates(&children, dirty_assets);
        let mut candidates = Vec::new();
        for pi in phases {
            if let Some(phase) = self.phases.get_mut(pi) {
                candidates.extend(
                    phase
                        .candidates(dirty_assets)
                        .into_iter()
                        .map(|si| StepAddr {
                            phase: pi,
                            step: si,
                        }),
                );
            }
        }
        candidates
    }

    pub fn update(&mut self, status: &TaskStatus) {
        debug!(plan = %self.name, task_id = %status.task_id, state = %status.state, "Updating plan with task status");
        self.phases.iter_mut().for_each(|p| p.update(status));
    }

    pub fn update_resources(&mut self, released: &HashSet<ResourceId>) {
        self.phases
            .iter_mut()
            .for_each(|p| p.update_resources(released));
    }

    pub fn update_parameters(&mut self, parameters: &BTreeMap<String, String>) {
        self.phases
            .iter_mut()
            .for_each(|p| p.update_parameters(parameters));
    }

    pub fn restart(&mut self) {
        info!(plan = %self.name, "Restarting plan");
        self.phases.iter_mut().for_each(Phase::restart);
    }

    pub fn force_complete(&mut self) {
        info!(plan = %self.name, "Forcing plan completion");
        self.phases.iter_mut().for_each(Phase::force_complete);
    }

    pub fn interrupt(&mut self) {
        self.strategy.interrupt();
    }

    pub fn proceed(&mut self) {
        self.strategy.proceed();
    }

    /// Finds phases by ID or name.
    pub fn find_phases(&self, id_or_name: &str) -> Vec<usize> {
        self.phases
            .iter()
            .enumerate()
            .filter(|(_, p)| p.id.to_string() == id_or_name || p.name == id_or_name)
            .map(|(i, _)| i)
            .collect()
    }

    /// Pod instances with work currently handed out.
    pub fn dirty_assets(&self) -> HashSet<String> {
        self.steps()
            .filter(|(_, step)| step.status().is_running())
            .filter_map(|(_, step)| step.asset().map(str::to_string))
            .collect()
    }

    /// Errors of this plan and everything under it.
    pub fn all_errors(&self) -> Vec<String> {
        let mut errors = self.errors.clone();
        for phase in &self.phases {
            errors.extend(phase.all_errors());
        }
        errors
    }
}

impl Element for Plan {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> Status {
        let children: Vec<&Phase> = self.phases.iter().collect();
        aggregate_status(
            &self.name,
            &self.errors,
            self.strategy.is_interrupted(),
            &children,
        )
    }

    fn errors(&self) -> &[String] {
        &self.errors
    }

    fn is_interrupted(&self) -> bool {
        self.strategy.is_interrupted()
    }
}

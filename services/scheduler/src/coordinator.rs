//! Arbitration of offers between plans.
//!
//! Every offer batch is handed to all plan managers in registration order.
//! A pod instance claimed by one manager, either in this batch or by a step
//! still in flight, is dirty for every other manager, so no two plans ever
//! work on the same pod instance at once.

use std::collections::HashSet;
use std::sync::Arc;

use keel_cluster::{Offer, OfferRecommendation, TaskStatus};
use keel_id::OfferId;
use tracing::{debug, info, instrument, warn};

use crate::driver::TaskKiller;
use crate::offer::{OfferAccepter, OfferEvaluator};
use crate::plan::{Element, Plan, PlanManager, PodInstanceRequirement, Status, Step, StepAddr};
use crate::store::StateStore;

/// Turns eligible steps into accepted offer operations.
pub struct PlanScheduler {
    evaluator: Arc<dyn OfferEvaluator>,
    accepter: OfferAccepter,
    store: Arc<dyn StateStore>,
    killer: TaskKiller,
}

impl PlanScheduler {
    pub fn new(
        evaluator: Arc<dyn OfferEvaluator>,
        accepter: OfferAccepter,
        store: Arc<dyn StateStore>,
        killer: TaskKiller,
    ) -> Self {
        Self {
            evaluator,
            accepter,
            store,
            killer,
        }
    }

    /// Starts `step` against `offers`, returning the offers it used.
    pub fn schedule(&self, step: &mut dyn Step, offers: &[Offer]) -> Vec<OfferId> {
        let status = step.status();
        if !matches!(status, Status::Pending | Status::Prepared) {
            debug!(step = %step.name(), %status, "Skipping step that is not pending");
            return Vec::new();
        }

        let Some(requirement) = step.start() else {
            step.update_offer_status(&[]);
            return Vec::new();
        };

        self.kill_running_tasks(&requirement);

        let recommendations = match self.evaluator.evaluate(&requirement, offers) {
            Ok(recommendations) => recommendations,
            Err(e) => {
                warn!(step = %step.name(), error = %e, "Offer evaluation failed");
                step.update_offer_status(&[]);
                return Vec::new();
            }
        };
        if recommendations.is_empty() {
            debug!(step = %step.name(), requirement = %requirement.name(), "No offers matched");
            step.update_offer_status(&[]);
            return Vec::new();
        }

        let used = self.accepter.accept(&recommendations);
        let sent: Vec<OfferRecommendation> = recommendations
            .into_iter()
            .filter(|r| !r.is_transient())
            .collect();
        step.update_offer_status(&sent);
        info!(step = %step.name(), operations = sent.len(), "Scheduled step");
        used
    }

    /// Kills live launches of the tasks about to be replaced.
    fn kill_running_tasks(&self, requirement: &PodInstanceRequirement) {
        for name in requirement.task_names() {
            let (task, status) = match (self.store.fetch_task(&name), self.store.fetch_status(&name)) {
                (Ok(Some(task)), Ok(Some(status))) => (task, status),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(task = %name, error = %e, "Failed to read task state");
                    continue;
                }
                _ => continue,
            };
            if status.task_id == task.task_id && !status.state.is_terminal() {
                self.killer.kill(&task.task_id);
            }
        }
    }
}

/// Collects candidates across plan managers and schedules them.
pub struct PlanCoordinator {
    managers: Vec<Box<dyn PlanManager>>,
    scheduler: PlanScheduler,
}

impl PlanCoordinator {
    pub fn new(managers: Vec<Box<dyn PlanManager>>, scheduler: PlanScheduler) -> Self {
        Self {
            managers,
            scheduler,
        }
    }

    /// Eligible steps of every manager, as (manager index, step address).
    ///
    /// Each manager sees as dirty the assets claimed earlier in this pass and
    /// the in-flight assets of every other manager.
    pub fn candidates(&mut self) -> Vec<(usize, StepAddr)> {
        let mut claimed: HashSet<String> = HashSet::new();
        let mut candidates = Vec::new();

        for i in 0..self.managers.len() {
            let mut dirty = claimed.clone();
            for (j, other) in self.managers.iter().enumerate() {
                if i != j {
                    dirty.extend(other.dirty_assets());
                }
            }

            let manager = &mut self.managers[i];
            for addr in manager.candidates(&dirty) {
                if let Some(asset) = manager.plan().step(addr).and_then(|s| s.asset()) {
                    claimed.insert(asset.to_string());
                }
                candidates.push((i, addr));
            }
        }
        candidates
    }

    /// Runs one scheduling pass over `offers`, returning the offers used.
    #[instrument(skip(self, offers), fields(offers = offers.len()))]
    pub fn process_offers(&mut self, offers: &[Offer]) -> Vec<OfferId> {
        let candidates = self.candidates();
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut available = offers.to_vec();
        let mut used = Vec::new();
        for (i, addr) in candidates {
            let Some(step) = self.managers[i].plan_mut().step_mut(addr) else {
                continue;
            };
            let ids = self.scheduler.schedule(step.as_mut(), &available);
            available.retain(|o| !ids.contains(&o.id));
            used.extend(ids);
        }
        used
    }

    pub fn update(&mut self, status: &TaskStatus) {
        for manager in &mut self.managers {
            manager.update(status);
        }
    }

    /// Some plan has work left that is not blocked by an operator.
    pub fn has_operations(&self) -> bool {
        self.managers.iter().any(|m| {
            let plan = m.plan();
            !plan.is_complete() && !plan.is_interrupted()
        })
    }

    pub fn managers(&self) -> impl Iterator<Item = &dyn PlanManager> {
        self.managers.iter().map(|m| m.as_ref())
    }

    pub fn plans(&self) -> impl Iterator<Item = &Plan> {
        self.managers.iter().map(|m| m.plan())
    }

    pub fn plan(&self, name: &str) -> Option<&Plan> {
        self.plans().find(|p| p.name() == name)
    }

    pub fn plan_mut(&mut self, name: &str) -> Option<&mut Plan> {
        self.managers
            .iter_mut()
            .map(|m| m.plan_mut())
            .find(|p| p.name() == name)
    }

    /// Registers `manager`, replacing any manager with the same plan name.
    pub fn replace_manager(&mut self, manager: Box<dyn PlanManager>) {
        let name = manager.name().to_string();
        match self.managers.iter().position(|m| m.name() == name) {
            Some(i) => self.managers[i] = manager,
            None => self.managers.push(manager),
        }
    }

    pub fn remove_manager(&mut self, name: &str) -> Option<Box<dyn PlanManager>> {
        let i = self.managers.iter().position(|m| m.name() == name)?;
        Some(self.managers.remove(i))
    }
}

//! Steps of a decommission phase.

use std::collections::HashSet;
use std::sync::Arc;

use keel_cluster::{OfferRecommendation, TaskInfo, TaskStatus};
use keel_id::{ResourceId, TaskId};
use tracing::{error, info};

use crate::driver::TaskKiller;
use crate::plan::{PodInstanceRequirement, Status, Step, StepBase};
use crate::store::{GoalOverrideStatus, StateStore};

/// Flags a task as being decommissioned and kills it.
pub struct TriggerDecommissionStep {
    base: StepBase,
    store: Arc<dyn StateStore>,
    killer: TaskKiller,
    task_name: String,
    task_id: TaskId,
}

impl TriggerDecommissionStep {
    pub fn new(store: Arc<dyn StateStore>, killer: TaskKiller, task: &TaskInfo) -> Self {
        Self {
            base: StepBase::new(
                format!("kill-{}", task.name),
                Status::Pending,
                Some(task.pod_instance_name()),
            ),
            store,
            killer,
            task_name: task.name.clone(),
            task_id: task.task_id.clone(),
        }
    }
}

impl Step for TriggerDecommissionStep {
    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn start(&mut self) -> Option<PodInstanceRequirement> {
        if let Err(e) = self
            .store
            .store_goal_override_status(&self.task_name, GoalOverrideStatus::DECOMMISSIONING)
        {
            error!(task = %self.task_name, error = %e, "Failed to mark task as decommissioning");
            return None;
        }
        info!(task = %self.task_name, "Decommissioning task");
        self.killer.kill(&self.task_id);
        self.base.status = Status::Complete;
        None
    }

    fn update_offer_status(&mut self, _recommendations: &[OfferRecommendation]) {}

    fn update(&mut self, _status: &TaskStatus) {}
}

crate::step_element!(TriggerDecommissionStep);

/// Waits for one reserved resource to be released.
pub struct ResourceCleanupStep {
    base: StepBase,
    resource_id: ResourceId,
}

impl ResourceCleanupStep {
    pub fn new(resource_id: ResourceId, asset: String) -> Self {
        Self {
            base: StepBase::new(format!("unreserve-{resource_id}"), Status::Pending, Some(asset)),
            resource_id,
        }
    }

    pub fn resource_id(&self) -> ResourceId {
        self.resource_id
    }
}

impl Step for ResourceCleanupStep {
    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn start(&mut self) -> Option<PodInstanceRequirement> {
        if self.base.status == Status::Pending {
            self.base.status = Status::InProgress;
        }
        None
    }

    fn update_offer_status(&mut self, _recommendations: &[OfferRecommendation]) {}

    fn update(&mut self, _status: &TaskStatus) {}

    fn update_resources(&mut self, released: &HashSet<ResourceId>) {
        if released.contains(&self.resource_id) && !self.base.status.is_complete() {
            info!(resource_id = %self.resource_id, "Resource released");
            self.base.status = Status::Complete;
        }
    }

    fn message(&self) -> String {
        format!(
            "waiting for resource {} to be released: {}",
            self.resource_id,
            self.base.display_status()
        )
    }
}

crate::step_element!(ResourceCleanupStep);

/// Deletes a task's persisted record once its resources are gone.
pub struct EraseTaskStateStep {
    base: StepBase,
    store: Arc<dyn StateStore>,
    task_name: String,
}

impl EraseTaskStateStep {
    pub fn new(store: Arc<dyn StateStore>, task: &TaskInfo) -> Self {
        Self {
            base: StepBase::new(
                format!("erase-{}", task.name),
                Status::Pending,
                Some(task.pod_instance_name()),
            ),
            store,
            task_name: task.name.clone(),
        }
    }
}

impl Step for EraseTaskStateStep {
    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn start(&mut self) -> Option<PodInstanceRequirement> {
        match self.store.clear_task(&self.task_name) {
            Ok(()) => {
                info!(task = %self.task_name, "Erased task state");
                self.base.status = Status::Complete;
            }
            Err(e) => error!(task = %self.task_name, error = %e, "Failed to erase task state"),
        }
        None
    }

    fn update_offer_status(&mut self, _recommendations: &[OfferRecommendation]) {}

    fn update(&mut self, _status: &TaskStatus) {}
}

crate::step_element!(EraseTaskStateStep);

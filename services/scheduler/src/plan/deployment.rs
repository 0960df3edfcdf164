//! Steps that launch the tasks of one pod instance.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use keel_cluster::{OfferRecommendation, TaskState, TaskStatus};
use keel_id::TaskId;
use tracing::{debug, info};

use super::{PodInstanceRequirement, Status, Step, StepBase};
use crate::recovery::LaunchConstrainer;
use crate::spec::GoalState;

/// Launches the tasks of a [`PodInstanceRequirement`] and tracks them until
/// each reaches its goal state.
pub struct DeploymentStep {
    base: StepBase,
    requirement: PodInstanceRequirement,
    goals: BTreeMap<String, GoalState>,
    tasks: HashMap<TaskId, Status>,
    constrainer: Option<Arc<dyn LaunchConstrainer>>,
}

impl DeploymentStep {
    pub fn new(name: impl Into<String>, status: Status, requirement: PodInstanceRequirement) -> Self {
        let pod = requirement.pod();
        let goals = requirement
            .tasks_to_launch()
            .iter()
            .filter_map(|t| pod.spec.task(t).map(|spec| (pod.task_name(t), spec.goal)))
            .collect();
        Self {
            base: StepBase::new(name, status, Some(requirement.asset())),
            requirement,
            goals,
            tasks: HashMap::new(),
            constrainer: None,
        }
    }

    /// Reports launches to `constrainer` so it can rate limit recoveries.
    #[must_use]
    pub fn with_constrainer(mut self, constrainer: Arc<dyn LaunchConstrainer>) -> Self {
        self.constrainer = Some(constrainer);
        self
    }

    /// Step status implied by one task's state.
    fn task_progress(&self, task_name: &str, state: TaskState) -> Status {
        let goal = self.goals.get(task_name).copied().unwrap_or(GoalState::Running);
        match state {
            TaskState::Staging | TaskState::Starting => Status::Starting,
            TaskState::Running => match goal {
                GoalState::Running => Status::Complete,
                GoalState::Finish | GoalState::Once => Status::Starting,
            },
            TaskState::Finished => match goal {
                GoalState::Finish | GoalState::Once => Status::Complete,
                GoalState::Running => Status::Pending,
            },
            TaskState::Killing
            | TaskState::Failed
            | TaskState::Killed
            | TaskState::Error
            | TaskState::Lost => Status::Pending,
        }
    }
}

impl Step for DeploymentStep {
    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn start(&mut self) -> Option<PodInstanceRequirement> {
        if self.base.status == Status::Pending {
            self.base.status = Status::Prepared;
        }
        Some(
            self.requirement
                .clone()
                .with_environment(self.base.parameters.clone()),
        )
    }

    fn update_offer_status(&mut self, recommendations: &[OfferRecommendation]) {
        if recommendations.is_empty() {
            debug!(step = %self.base.name, "No operations for step, returning to PENDING");
            self.base.status = Status::Pending;
            return;
        }

        self.tasks = recommendations
            .iter()
            .filter_map(|rec| match rec {
                OfferRecommendation::Launch {
                    task,
                    transient: false,
                    ..
                } => Some((task.task_id.clone(), Status::InProgress)),
                _ => None,
            })
            .collect();
        self.base.status = Status::InProgress;

        if !self.tasks.is_empty() {
            if let Some(constrainer) = &self.constrainer {
                constrainer.launch_happened(self.requirement.recovery_type());
            }
        }
        info!(
            step = %self.base.name,
            launched = self.tasks.len(),
            "Step operations accepted"
        );
    }

    fn update(&mut self, status: &TaskStatus) {
        if self.base.status.is_complete() {
            return;
        }
        if !self.tasks.contains_key(&status.task_id) {
            return;
        }

        let progress = self.task_progress(status.task_id.task_name(), status.state);
        self.tasks.insert(status.task_id.clone(), progress);

        let next = self
            .tasks
            .values()
            .copied()
            .min()
            .unwrap_or(Status::Pending);
        if next != self.base.status {
            debug!(
                step = %self.base.name,
                task_id = %status.task_id,
                state = %status.state,
                from = %self.base.status,
                to = %next,
                "Step status changed"
            );
        }
        self.base.status = next;
    }

    fn requirement(&self) -> Option<&PodInstanceRequirement> {
        Some(&self.requirement)
    }

    fn message(&self) -> String {
        format!(
            "deploying {} has status {}",
            self.requirement.name(),
            self.base.display_status()
        )
    }

    fn restart(&mut self) {
        self.tasks.clear();
        self.base.status = Status::Pending;
        self.base.errors.clear();
    }
}

crate::step_element!(DeploymentStep);

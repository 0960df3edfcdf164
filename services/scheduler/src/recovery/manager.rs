//! The recovery plan.
//!
//! The recovery plan is recomputed from the state store on every candidate
//! query and every status update. Each failed pod instance gets a phase of
//! its own holding a single [`DeploymentStep`], keyed by the pod instance
//! name, so repeated failure reports for the same pod never produce more than
//! one step.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use keel_cluster::{TaskInfo, TaskState, TaskStatus};
use tracing::{debug, error, info, warn};

use super::{FailureMonitor, LaunchConstrainer};
use crate::error::SchedulerError;
use crate::plan::{
    DeploymentStep, Element, Phase, Plan, PlanManager, PodInstance, PodInstanceRequirement,
    RecoveryType, Status, StepAddr,
};
use crate::spec::{GoalState, ServiceSpec};
use crate::store::StateStore;
use crate::strategy::ParallelStrategy;

pub const RECOVERY_PLAN_NAME: &str = "recovery";

/// Failed tasks of one pod instance.
struct FailedPod {
    instance: PodInstance,
    tasks: Vec<TaskInfo>,
}

pub struct RecoveryPlanManager {
    plan: Plan,
    spec: Arc<ServiceSpec>,
    store: Arc<dyn StateStore>,
    constrainer: Arc<dyn LaunchConstrainer>,
    monitor: Arc<dyn FailureMonitor>,
}

impl RecoveryPlanManager {
    pub fn new(
        spec: Arc<ServiceSpec>,
        store: Arc<dyn StateStore>,
        constrainer: Arc<dyn LaunchConstrainer>,
        monitor: Arc<dyn FailureMonitor>,
    ) -> Self {
        Self {
            plan: Plan::new(RECOVERY_PLAN_NAME, Vec::new(), Box::new(ParallelStrategy::new())),
            spec,
            store,
            constrainer,
            monitor,
        }
    }

    pub fn set_service_spec(&mut self, spec: Arc<ServiceSpec>) {
        self.spec = spec;
    }

    /// Reconciles the plan with the failures currently in the state store.
    ///
    /// Pods in `dirty_assets` and pods whose recovery is already running are
    /// left alone.
    pub fn update_plan(&mut self, dirty_assets: &HashSet<String>) -> Result<(), SchedulerError> {
        let failed = self.failed_pods()?;

        let mut untouchable = dirty_assets.clone();
        untouchable.extend(self.plan.dirty_assets());

        let mut fresh: BTreeMap<String, Phase> = BTreeMap::new();
        for (name, pod) in &failed {
            if untouchable.contains(name) {
                debug!(pod = %name, "Skipping recovery of pod with work in flight");
                continue;
            }
            let Some(requirement) = self.requirement(pod)? else {
                continue;
            };
            if self.has_pending_step(name, &requirement) {
                continue;
            }
            info!(
                pod = %name,
                recovery_type = ?requirement.recovery_type(),
                tasks = ?requirement.tasks_to_launch(),
                "Scheduling pod recovery"
            );
            fresh.insert(name.clone(), self.phase(requirement));
        }

        let existing = self.plan.replace_phases(Vec::new());
        let mut phases = Vec::with_capacity(existing.len() + fresh.len());
        for phase in existing {
            let name = phase.name().to_string();
            if let Some(replacement) = fresh.remove(&name) {
                phases.push(replacement);
            } else if phase.status() == Status::Pending && !failed.contains_key(&name) {
                debug!(pod = %name, "Dropping recovery of pod that no longer fails");
            } else {
                phases.push(phase);
            }
        }
        phases.extend(fresh.into_values());
        self.plan.replace_phases(phases);
        Ok(())
    }

    /// An existing, not yet started step already covers this requirement.
    fn has_pending_step(&self, pod_name: &str, requirement: &PodInstanceRequirement) -> bool {
        self.plan
            .phases()
            .iter()
            .filter(|p| p.name() == pod_name)
            .flat_map(|p| p.steps())
            .any(|step| {
                !step.is_complete()
                    && step.requirement().is_some_and(|r| {
                        r.recovery_type() == requirement.recovery_type()
                            && r.tasks_to_launch() == requirement.tasks_to_launch()
                    })
            })
    }

    fn phase(&self, requirement: PodInstanceRequirement) -> Phase {
        let name = requirement.pod().name();
        let step = DeploymentStep::new(name.clone(), Status::Pending, requirement)
            .with_constrainer(self.constrainer.clone());
        Phase::new(name, vec![Box::new(step)], Box::new(ParallelStrategy::new()))
    }

    /// Failed tasks grouped by pod instance name.
    fn failed_pods(&self) -> Result<BTreeMap<String, FailedPod>, SchedulerError> {
        let mut pods: BTreeMap<String, FailedPod> = BTreeMap::new();
        for task in self.store.fetch_tasks()? {
            let Some(pod_spec) = self.spec.pod(&task.pod_type) else {
                continue;
            };
            if task.pod_index >= pod_spec.count {
                continue;
            }
            if self
                .store
                .fetch_goal_override_status(&task.name)?
                .is_decommission()
            {
                continue;
            }
            let Some(task_spec) = pod_spec.task(&task.task_spec) else {
                continue;
            };

            let status = self.store.fetch_status(&task.name)?;
            if !task.permanently_failed && !needs_recovery(task_spec.goal, &task, status.as_ref()) {
                continue;
            }

            pods.entry(task.pod_instance_name())
                .or_insert_with(|| FailedPod {
                    instance: PodInstance {
                        spec: pod_spec.clone(),
                        index: task.pod_index,
                    },
                    tasks: Vec::new(),
                })
                .tasks
                .push(task);
        }
        Ok(pods)
    }

    fn requirement(
        &self,
        pod: &FailedPod,
    ) -> Result<Option<PodInstanceRequirement>, SchedulerError> {
        let permanent = pod
            .tasks
            .iter()
            .filter(|t| t.permanently_failed || self.monitor.has_failed(t))
            .count();
        let recovery_type = if permanent == pod.tasks.len() {
            RecoveryType::Permanent
        } else if permanent == 0 {
            RecoveryType::Transient
        } else {
            error!(
                pod = %pod.instance.name(),
                permanent,
                failed = pod.tasks.len(),
                "Tasks of pod disagree on recovery type, not recovering"
            );
            return Ok(None);
        };

        let mut tasks: Vec<String> = pod.tasks.iter().map(|t| t.task_spec.clone()).collect();
        if recovery_type == RecoveryType::Permanent {
            // Replacing the pod's resources takes every long-running task with it.
            for spec in &pod.instance.spec.tasks {
                if spec.goal == GoalState::Running && !tasks.contains(&spec.name) {
                    tasks.push(spec.name.clone());
                }
            }
        }
        let order: Vec<&str> = pod.instance.spec.tasks.iter().map(|t| t.name.as_str()).collect();
        tasks.sort_by_key(|t| order.iter().position(|o| *o == t.as_str()));

        Ok(Some(
            PodInstanceRequirement::new(pod.instance.clone(), tasks)?
                .with_recovery_type(recovery_type),
        ))
    }
}

/// The task's latest launch ended short of its goal.
fn needs_recovery(goal: GoalState, task: &TaskInfo, status: Option<&TaskStatus>) -> bool {
    let Some(status) = status else {
        return false;
    };
    if status.task_id != task.task_id {
        return false;
    }
    status.state.needs_recovery() || (status.state == TaskState::Finished && goal == GoalState::Running)
}

impl PlanManager for RecoveryPlanManager {
    fn plan(&self) -> &Plan {
        &self.plan
    }

    fn plan_mut(&mut self) -> &mut Plan {
        &mut self.plan
    }

    fn candidates(&mut self, dirty_assets: &HashSet<String>) -> Vec<StepAddr> {
        if let Err(e) = self.update_plan(dirty_assets) {
            warn!(error = %e, "Failed to update recovery plan");
        }
        let candidates = self.plan.candidates(dirty_assets);
        candidates
            .into_iter()
            .filter(|addr| {
                let allowed = self
                    .plan
                    .step(*addr)
                    .and_then(|s| s.requirement())
                    .is_none_or(|r| self.constrainer.can_launch(r.recovery_type()));
                if !allowed {
                    debug!(phase = addr.phase, step = addr.step, "Recovery launch rate limited");
                }
                allowed
            })
            .collect()
    }

    fn update(&mut self, status: &TaskStatus) {
        self.plan.update(status);
        if let Err(e) = self.update_plan(&HashSet::new()) {
            warn!(error = %e, "Failed to update recovery plan");
        }
    }
}

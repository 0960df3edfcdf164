//! Construction of the decommission plan.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use keel_cluster::TaskInfo;
use tracing::info;

use super::{EraseTaskStateStep, PodKey, ResourceCleanupStep, TriggerDecommissionStep};
use crate::driver::TaskKiller;
use crate::error::SchedulerError;
use crate::plan::{Phase, Plan, Step};
use crate::spec::ServiceSpec;
use crate::store::{GoalOverrideStatus, StateStore};
use crate::strategy::SerialStrategy;

pub const DECOMMISSION_PLAN_NAME: &str = "decommission";

/// Builds the plan removing pods that are no longer part of the service.
pub struct DecommissionPlanFactory {
    store: Arc<dyn StateStore>,
    killer: TaskKiller,
}

impl DecommissionPlanFactory {
    pub fn new(store: Arc<dyn StateStore>, killer: TaskKiller) -> Self {
        Self { store, killer }
    }

    /// Updates decommission overrides in the store and returns the plan, or
    /// `None` when nothing needs to be decommissioned.
    ///
    /// Tasks previously flagged for decommission that are wanted again get
    /// their override cleared.
    pub fn build(&self, spec: &ServiceSpec) -> Result<Option<Plan>, SchedulerError> {
        let tasks = self.store.fetch_tasks()?;
        let pods = pods_to_decommission(spec, &tasks);
        let targeted: HashSet<&str> = pods
            .values()
            .flat_map(|tasks| tasks.iter().map(|t| t.name.as_str()))
            .collect();

        for task in &tasks {
            let current = self.store.fetch_goal_override_status(&task.name)?;
            if targeted.contains(task.name.as_str()) {
                if !current.is_decommission() {
                    info!(task = %task.name, "Marking task as pending decommission");
                    self.store.store_goal_override_status(
                        &task.name,
                        GoalOverrideStatus::DECOMMISSION_PENDING,
                    )?;
                }
            } else if current.is_decommission() {
                info!(task = %task.name, "Clearing prior decommission state");
                self.store
                    .store_goal_override_status(&task.name, GoalOverrideStatus::INACTIVE)?;
            }
        }

        if pods.is_empty() {
            return Ok(None);
        }

        let phases = pods
            .into_iter()
            .map(|(key, tasks)| self.phase(&key, &tasks))
            .collect();
        Ok(Some(Plan::serial(DECOMMISSION_PLAN_NAME, phases)))
    }

    fn phase(&self, key: &PodKey, tasks: &[&TaskInfo]) -> Phase {
        let pod_name = key.pod_name();
        let mut steps: Vec<Box<dyn Step>> = Vec::new();

        for task in tasks {
            steps.push(Box::new(TriggerDecommissionStep::new(
                self.store.clone(),
                self.killer.clone(),
                task,
            )));
        }
        for task in tasks {
            for resource_id in task.resources.iter().filter_map(|r| r.id) {
                steps.push(Box::new(ResourceCleanupStep::new(
                    resource_id,
                    pod_name.clone(),
                )));
            }
        }
        for task in tasks {
            steps.push(Box::new(EraseTaskStateStep::new(self.store.clone(), task)));
        }

        Phase::new(pod_name, steps, Box::new(SerialStrategy::new()))
    }
}

/// Tasks to decommission grouped by pod, in decommission order.
pub(crate) fn pods_to_decommission<'a>(
    spec: &ServiceSpec,
    tasks: &'a [TaskInfo],
) -> BTreeMap<PodKey, Vec<&'a TaskInfo>> {
    let reversed: Vec<&str> = spec.pods.iter().rev().map(|p| p.pod_type.as_str()).collect();

    let mut pods: BTreeMap<PodKey, Vec<&TaskInfo>> = BTreeMap::new();
    for task in tasks {
        match spec.pod(&task.pod_type) {
            None => info!(
                task = %task.name,
                pod_type = %task.pod_type,
                "Scheduling task for decommission: pod type not in service spec"
            ),
            Some(pod) if task.pod_index >= pod.count => info!(
                task = %task.name,
                count = pod.count,
                "Scheduling task for decommission: pod index exceeds count"
            ),
            Some(_) => continue,
        }
        pods.entry(PodKey::new(task.pod_type.clone(), task.pod_index, &reversed))
            .or_default()
            .push(task);
    }
    pods
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::RecordingDriver;
    use crate::plan::{Element, Status};
    use crate::spec::fixtures;
    use crate::store::fixtures::task_info;
    use crate::store::{GoalOverride, MemoryStateStore, OverrideProgress};
    use keel_cluster::Resource;
    use keel_id::ResourceId;

    fn with_resources(mut task: TaskInfo, count: usize) -> TaskInfo {
        task.resources = (0..count)
            .map(|_| Resource::reserved(ResourceId::new(), "cpus", 0.1))
            .collect();
        task
    }

    /// podA: 3 instances, count now 1. podB: 2 instances of two tasks, count
    /// now 1. podC: matches its count. podD and podE: no longer in the spec.
    fn tasks() -> Vec<TaskInfo> {
        vec![
            with_resources(task_info("podA", 0, "taskA"), 1),
            with_resources(task_info("podA", 1, "taskA"), 2),
            with_resources(task_info("podA", 2, "taskA"), 3),
            with_resources(task_info("podB", 0, "taskA"), 1),
            with_resources(task_info("podB", 0, "taskB"), 2),
            with_resources(task_info("podB", 1, "taskA"), 1),
            with_resources(task_info("podB", 1, "taskB"), 2),
            with_resources(task_info("podC", 0, "taskA"), 3),
            with_resources(task_info("podD", 0, "taskA"), 3),
            with_resources(task_info("podD", 1, "taskA"), 1),
            with_resources(task_info("podE", 0, "taskA"), 2),
        ]
    }

    fn overrides() -> [GoalOverrideStatus; 4] {
        [
            GoalOverrideStatus::DECOMMISSION_PENDING,
            GoalOverrideStatus::DECOMMISSIONING,
            GoalOverrideStatus::INACTIVE,
            GoalOverrideStatus {
                target: GoalOverride::None,
                progress: OverrideProgress::Pending,
            },
        ]
    }

    fn setup(counts: &[(&str, u32)]) -> (Arc<MemoryStateStore>, DecommissionPlanFactory, ServiceSpec) {
        let store = Arc::new(MemoryStateStore::new());
        let tasks = tasks();
        store.store_tasks(&tasks).unwrap();
        for (i, task) in tasks.iter().enumerate() {
            store
                .store_goal_override_status(&task.name, overrides()[i % 4])
                .unwrap();
        }
        let spec = fixtures::service(
            counts
                .iter()
                .map(|(pod_type, count)| fixtures::pod(pod_type, *count))
                .collect(),
        );
        let killer = TaskKiller::new(Arc::new(RecordingDriver::new()));
        let factory = DecommissionPlanFactory::new(store.clone(), killer);
        (store, factory, spec)
    }

    #[test]
    fn test_no_decommission() {
        let (store, factory, spec) = setup(&[
            ("podA", 3),
            ("podB", 100),
            ("podC", 1),
            ("podD", 2),
            ("podE", 2),
        ]);
        assert!(factory.build(&spec).unwrap().is_none());

        for task in store.fetch_tasks().unwrap() {
            assert!(
                !store.fetch_goal_override_status(&task.name).unwrap().is_decommission(),
                "{} still flagged",
                task.name
            );
        }
    }

    #[test]
    fn test_big_plan_construction() {
        let (store, factory, spec) = setup(&[("podA", 1), ("podB", 1), ("podC", 1)]);
        let plan = factory.build(&spec).unwrap().unwrap();

        assert_eq!(plan.name(), DECOMMISSION_PLAN_NAME);
        assert_eq!(plan.status(), Status::Pending);
        let phases: Vec<&str> = plan.phases().iter().map(|p| p.name()).collect();
        assert_eq!(
            phases,
            vec!["podD-1", "podD-0", "podE-0", "podB-1", "podA-2", "podA-1"]
        );

        let steps: Vec<&str> = plan.phases()[3].steps().iter().map(|s| s.name()).collect();
        assert_eq!(steps.len(), 7);
        assert_eq!(&steps[..2], ["kill-podB-1-taskA", "kill-podB-1-taskB"]);
        assert!(steps[2..5].iter().all(|s| s.starts_with("unreserve-res_")));
        assert_eq!(&steps[5..], ["erase-podB-1-taskA", "erase-podB-1-taskB"]);

        let resource_steps = plan
            .steps()
            .filter(|(_, s)| s.name().starts_with("unreserve-"))
            .count();
        assert_eq!(resource_steps, 14);

        // Wanted tasks lose their decommission flag, targeted ones gain it.
        for name in ["podA-0-taskA", "podB-0-taskB"] {
            assert_eq!(
                store.fetch_goal_override_status(name).unwrap(),
                GoalOverrideStatus::INACTIVE
            );
        }
        for name in ["podA-2-taskA", "podB-1-taskB", "podE-0-taskA"] {
            assert_eq!(
                store.fetch_goal_override_status(name).unwrap(),
                GoalOverrideStatus::DECOMMISSION_PENDING
            );
        }
        assert_eq!(
            store.fetch_goal_override_status("podA-1-taskA").unwrap(),
            GoalOverrideStatus::DECOMMISSIONING
        );
    }
}

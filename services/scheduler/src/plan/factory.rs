//! Construction of the deploy plan from a service spec.

use keel_cluster::TaskState;
use tracing::{debug, info};

use super::{DeploymentStep, Phase, Plan, PodInstance, PodInstanceRequirement, Status, Step};
use crate::error::SchedulerError;
use crate::spec::{GoalState, PodSpec, ServiceSpec};
use crate::store::StateStore;
use crate::strategy::StrategyFactory;

pub const DEPLOY_PLAN_NAME: &str = "deploy";

/// Builds the plan that rolls a service out to its target configuration.
///
/// Pods already running the target configuration start out complete, so a
/// rebuilt plan only touches instances that actually need to change.
pub struct DeployPlanFactory<'a> {
    store: &'a dyn StateStore,
}

impl<'a> DeployPlanFactory<'a> {
    pub fn new(store: &'a dyn StateStore) -> Self {
        Self { store }
    }

    pub fn build(&self, spec: &ServiceSpec, config_id: &str) -> Result<Plan, SchedulerError> {
        let mut phases = Vec::with_capacity(spec.pods.len());
        for pod in &spec.pods {
            let mut steps: Vec<Box<dyn Step>> = Vec::with_capacity(pod.count as usize);
            for index in 0..pod.count {
                steps.push(Box::new(self.step(pod, index, config_id)?));
            }
            phases.push(Phase::new(
                pod.pod_type.clone(),
                steps,
                StrategyFactory::generate(pod.strategy.as_deref()),
            ));
        }

        let plan = Plan::new(
            DEPLOY_PLAN_NAME,
            phases,
            StrategyFactory::generate(spec.deploy_strategy.as_deref()),
        );
        info!(
            service = %spec.name,
            config_id,
            phases = plan.phases().len(),
            "Built deploy plan"
        );
        Ok(plan)
    }

    fn step(
        &self,
        pod: &PodSpec,
        index: u32,
        config_id: &str,
    ) -> Result<DeploymentStep, SchedulerError> {
        let instance = PodInstance {
            spec: pod.clone(),
            index,
        };

        let mut to_launch = Vec::new();
        for task in &pod.tasks {
            if task.goal == GoalState::Once && self.has_finished(&instance.task_name(&task.name))? {
                debug!(task = %instance.task_name(&task.name), "Skipping finished ONCE task");
                continue;
            }
            to_launch.push(task.name.clone());
        }

        let (tasks, complete) = if to_launch.is_empty() {
            (pod.tasks.iter().map(|t| t.name.clone()).collect(), true)
        } else {
            let complete = self.at_goal(&instance, &to_launch, config_id)?;
            (to_launch, complete)
        };

        let status = if complete {
            Status::Complete
        } else {
            Status::Pending
        };
        let requirement = PodInstanceRequirement::new(instance, tasks)?;
        Ok(DeploymentStep::new(
            requirement.pod().name(),
            status,
            requirement,
        ))
    }

    fn has_finished(&self, task_name: &str) -> Result<bool, SchedulerError> {
        Ok(self
            .store
            .fetch_status(task_name)?
            .is_some_and(|s| s.state == TaskState::Finished))
    }

    /// Every listed task is stored with the target config and in its goal state.
    fn at_goal(
        &self,
        instance: &PodInstance,
        tasks: &[String],
        config_id: &str,
    ) -> Result<bool, SchedulerError> {
        for task in tasks {
            let name = instance.task_name(task);
            let Some(info) = self.store.fetch_task(&name)? else {
                return Ok(false);
            };
            if info.target_config != config_id {
                return Ok(false);
            }
            let Some(status) = self.store.fetch_status(&name)? else {
                return Ok(false);
            };
            if status.task_id != info.task_id {
                return Ok(false);
            }
            let goal = instance
                .spec
                .task(task)
                .map(|t| t.goal)
                .unwrap_or(GoalState::Running);
            let reached = match goal {
                GoalState::Running => status.state == TaskState::Running,
                GoalState::Finish | GoalState::Once => status.state == TaskState::Finished,
            };
            if !reached {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Element;
    use crate::spec::fixtures;
    use crate::store::fixtures::task_info;
    use crate::store::MemoryStateStore;
    use keel_cluster::TaskStatus;

    #[test]
    fn test_fresh_service() {
        let store = MemoryStateStore::new();
        let spec = fixtures::service(vec![fixtures::pod("data", 2), fixtures::pod("web", 1)]);
        let plan = DeployPlanFactory::new(&store).build(&spec, "cfg").unwrap();

        assert_eq!(plan.name(), DEPLOY_PLAN_NAME);
        assert_eq!(plan.status(), Status::Pending);
        let names: Vec<&str> = plan.phases().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["data", "web"]);
        let steps: Vec<&str> = plan.phases()[0].steps().iter().map(|s| s.name()).collect();
        assert_eq!(steps, vec!["data-0", "data-1"]);
        assert_eq!(plan.phases()[0].steps()[1].asset(), Some("data-1"));
    }

    #[test]
    fn test_running_pods_at_target_config_are_complete() {
        let store = MemoryStateStore::new();
        let task = task_info("data", 0, "server");
        store.store_tasks(&[task.clone()]).unwrap();
        store
            .store_status(&task.name, &TaskStatus::new(task.task_id.clone(), TaskState::Running))
            .unwrap();

        let spec = fixtures::service(vec![fixtures::pod("data", 2)]);
        let factory = DeployPlanFactory::new(&store);

        let plan = factory.build(&spec, "cfg").unwrap();
        let steps = plan.phases()[0].steps();
        assert_eq!(steps[0].status(), Status::Complete);
        assert_eq!(steps[1].status(), Status::Pending);
        assert_eq!(plan.status(), Status::InProgress);

        let plan = factory.build(&spec, "new-cfg").unwrap();
        assert_eq!(plan.phases()[0].steps()[0].status(), Status::Pending);
    }

    #[test]
    fn test_finished_once_task_is_not_relaunched() {
        let store = MemoryStateStore::new();
        let mut pod = fixtures::pod("data", 1);
        pod.tasks.push(fixtures::task("init", GoalState::Once));

        let init = task_info("data", 0, "init");
        store.store_tasks(&[init.clone()]).unwrap();
        store
            .store_status(&init.name, &TaskStatus::new(init.task_id.clone(), TaskState::Finished))
            .unwrap();

        let spec = fixtures::service(vec![pod]);
        let plan = DeployPlanFactory::new(&store).build(&spec, "cfg").unwrap();
        let step = &plan.phases()[0].steps()[0];
        let requirement = step.requirement().unwrap();
        assert_eq!(requirement.tasks_to_launch().to_vec(), vec!["server".to_string()]);
    }

    #[test]
    fn test_strategies_from_spec() {
        let store = MemoryStateStore::new();
        let mut pod = fixtures::pod("data", 3);
        pod.strategy = Some("parallel".to_string());
        let mut spec = fixtures::service(vec![pod]);
        spec.deploy_strategy = Some("serial".to_string());

        let plan = DeployPlanFactory::new(&store).build(&spec, "cfg").unwrap();
        assert_eq!(plan.strategy_name(), "serial");
        assert_eq!(plan.phases()[0].strategy_name(), "parallel");
    }
}

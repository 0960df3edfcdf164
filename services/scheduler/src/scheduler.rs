//! The scheduler façade.
//!
//! [`Scheduler`] wires the plan managers, the coordinator and the offer
//! collaborators together and is the single entry point for offers, task
//! statuses and service spec changes. It is driven by one worker at a time.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use keel_cluster::{Offer, TaskInfo, TaskStatus};
use keel_id::{FrameworkId, OfferId, ResourceId};
use tracing::{debug, info, instrument, warn};

use crate::coordinator::{PlanCoordinator, PlanScheduler};
use crate::decommission::{DecommissionPlanFactory, DECOMMISSION_PLAN_NAME};
use crate::driver::{SchedulerDriver, TaskKiller};
use crate::error::SchedulerError;
use crate::offer::{
    DecommissionRecorder, OfferAccepter, OperationRecorder, PersistentLaunchRecorder,
    ResourceCleaner, ScalarOfferEvaluator,
};
use crate::plan::{
    DefaultPlanManager, DeployPlanFactory, Element, Plan, PlanManager, RecoveryType,
};
use crate::recovery::{
    FailureMonitor, LaunchConstrainer, NeverFailureMonitor, RecoveryPlanManager,
    TimedFailureMonitor, TimedLaunchConstrainer,
};
use crate::spec::ServiceSpec;
use crate::store::{GoalOverrideStatus, StateStore};

/// One stored task of a pod instance with its latest known state.
#[derive(Debug, Clone)]
pub struct PodTask {
    pub info: TaskInfo,
    pub status: Option<TaskStatus>,
    pub goal_override: GoalOverrideStatus,
}

/// Recovery tuning.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Minimum delay between two permanent recoveries.
    pub permanent_launch_delay: Duration,
    /// How long a task may stay failed before it is replaced; `None` never
    /// replaces tasks on its own.
    pub permanent_failure_timeout: Option<Duration>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            permanent_launch_delay: Duration::from_secs(600),
            permanent_failure_timeout: None,
        }
    }
}

pub struct Scheduler {
    spec: Arc<ServiceSpec>,
    store: Arc<dyn StateStore>,
    driver: Arc<dyn SchedulerDriver>,
    killer: TaskKiller,
    coordinator: PlanCoordinator,
    cleaner: ResourceCleaner,
    cleanup_accepter: OfferAccepter,
    constrainer: Arc<dyn LaunchConstrainer>,
    monitor: Arc<dyn FailureMonitor>,
    framework_id: Option<FrameworkId>,
    suppressed: Option<bool>,
}

impl Scheduler {
    pub fn new(
        spec: ServiceSpec,
        store: Arc<dyn StateStore>,
        driver: Arc<dyn SchedulerDriver>,
        options: SchedulerOptions,
    ) -> Result<Self, SchedulerError> {
        spec.validate()?;
        let config_id = spec.config_id()?;
        store.store_target_config(&config_id)?;
        let spec = Arc::new(spec);

        let killer = TaskKiller::new(driver.clone());
        let constrainer: Arc<dyn LaunchConstrainer> =
            Arc::new(TimedLaunchConstrainer::new(options.permanent_launch_delay));
        let monitor: Arc<dyn FailureMonitor> = match options.permanent_failure_timeout {
            Some(timeout) => Arc::new(TimedFailureMonitor::new(timeout)),
            None => Arc::new(NeverFailureMonitor),
        };

        let recorders: Vec<Arc<dyn OperationRecorder>> = vec![
            Arc::new(PersistentLaunchRecorder::new(store.clone())),
            Arc::new(DecommissionRecorder::new(store.clone())),
        ];
        let plan_scheduler = PlanScheduler::new(
            Arc::new(ScalarOfferEvaluator::new(store.clone())),
            OfferAccepter::new(driver.clone(), recorders.clone()),
            store.clone(),
            killer.clone(),
        );

        let deploy = DeployPlanFactory::new(store.as_ref()).build(&spec, &config_id)?;
        let recovery = RecoveryPlanManager::new(
            spec.clone(),
            store.clone(),
            constrainer.clone(),
            monitor.clone(),
        );
        let managers: Vec<Box<dyn PlanManager>> = vec![
            Box::new(DefaultPlanManager::new(deploy)),
            Box::new(recovery),
        ];

        let mut scheduler = Self {
            cleaner: ResourceCleaner::new(store.clone()),
            cleanup_accepter: OfferAccepter::new(driver.clone(), recorders),
            coordinator: PlanCoordinator::new(managers, plan_scheduler),
            spec,
            store,
            driver,
            killer,
            constrainer,
            monitor,
            framework_id: None,
            suppressed: None,
        };
        scheduler.rebuild_decommission()?;
        info!(service = %scheduler.spec.name, config_id = %config_id, "Scheduler initialized");
        Ok(scheduler)
    }

    pub fn service_spec(&self) -> &ServiceSpec {
        &self.spec
    }

    pub fn framework_id(&self) -> Option<FrameworkId> {
        self.framework_id
    }

    pub fn is_registered(&self) -> bool {
        self.framework_id.is_some()
    }

    /// Persists the framework identity. Failure is fatal.
    pub fn register(&mut self, framework_id: FrameworkId) -> Result<(), SchedulerError> {
        self.store
            .store_framework_id(framework_id)
            .map_err(SchedulerError::Registration)?;
        self.framework_id = Some(framework_id);
        info!(framework_id = %framework_id, "Registered with cluster manager");
        self.suppressed = None;
        self.update_offer_interest();
        Ok(())
    }

    /// Runs one full pass over an offer batch and returns the offers used.
    #[instrument(skip(self, offers), fields(offers = offers.len()))]
    pub fn process_offers(&mut self, offers: Vec<Offer>) -> Vec<OfferId> {
        self.refresh_decommission();

        let mut used = self.coordinator.process_offers(&offers);

        let unused: Vec<Offer> = offers
            .iter()
            .filter(|o| !used.contains(&o.id))
            .cloned()
            .collect();
        used.extend(self.clean_up(&unused));

        let declined: Vec<OfferId> = offers
            .iter()
            .map(|o| o.id)
            .filter(|id| !used.contains(id))
            .collect();
        self.driver.decline(&declined);

        self.update_offer_interest();
        used
    }

    /// Releases unexpected reservations found in `offers`.
    fn clean_up(&mut self, offers: &[Offer]) -> Vec<OfferId> {
        let recommendations = match self.cleaner.evaluate(offers) {
            Ok(recommendations) => recommendations,
            Err(e) => {
                warn!(error = %e, "Resource cleanup failed");
                return Vec::new();
            }
        };
        if recommendations.is_empty() {
            return Vec::new();
        }

        let used = self.cleanup_accepter.accept(&recommendations);
        let released: HashSet<ResourceId> = recommendations
            .iter()
            .filter_map(|r| r.released_resource().and_then(|res| res.id))
            .collect();
        if let Some(plan) = self.coordinator.plan_mut(DECOMMISSION_PLAN_NAME) {
            plan.update_resources(&released);
        }
        used
    }

    /// Accepts a task status from the cluster manager.
    ///
    /// Statuses for unknown tasks or for superseded launches are dropped.
    #[instrument(skip(self, status), fields(task_id = %status.task_id, state = %status.state))]
    pub fn process_status(&mut self, status: TaskStatus) -> Result<(), SchedulerError> {
        let task_name = status.task_id.task_name();
        let Some(task) = self.store.fetch_task(task_name)? else {
            debug!("Dropping status for unknown task");
            return Ok(());
        };
        if task.task_id != status.task_id {
            debug!(current = %task.task_id, "Dropping status for superseded launch");
            return Ok(());
        }

        self.store.store_status(task_name, &status)?;
        self.monitor.observe(&status);
        self.coordinator.update(&status);
        self.update_offer_interest();
        Ok(())
    }

    /// Switches to a new target configuration.
    pub fn update_service_spec(&mut self, spec: ServiceSpec) -> Result<(), SchedulerError> {
        spec.validate()?;
        let config_id = spec.config_id()?;
        self.restamp_unchanged_tasks(&spec, &config_id)?;
        self.store.store_target_config(&config_id)?;
        self.spec = Arc::new(spec);

        let deploy = DeployPlanFactory::new(self.store.as_ref()).build(&self.spec, &config_id)?;
        self.coordinator
            .replace_manager(Box::new(DefaultPlanManager::new(deploy)));
        self.coordinator.replace_manager(Box::new(RecoveryPlanManager::new(
            self.spec.clone(),
            self.store.clone(),
            self.constrainer.clone(),
            self.monitor.clone(),
        )));
        self.rebuild_decommission()?;

        info!(service = %self.spec.name, config_id = %config_id, "Service spec updated");
        self.update_offer_interest();
        Ok(())
    }

    /// Moves tasks whose definition is identical in `spec` onto the new
    /// target configuration so they are not redeployed.
    fn restamp_unchanged_tasks(
        &self,
        spec: &ServiceSpec,
        config_id: &str,
    ) -> Result<(), SchedulerError> {
        let current = self.spec.config_id()?;
        let mut restamped = Vec::new();
        for mut task in self.store.fetch_tasks()? {
            if task.target_config != current {
                continue;
            }
            let before = self.spec.pod(&task.pod_type).and_then(|p| p.task(&task.task_spec));
            let after = spec.pod(&task.pod_type).and_then(|p| p.task(&task.task_spec));
            if before.is_some() && before == after {
                task.target_config = config_id.to_string();
                restamped.push(task);
            }
        }
        if !restamped.is_empty() {
            debug!(tasks = restamped.len(), "Carrying unchanged tasks over to new target config");
            self.store.store_tasks(&restamped)?;
        }
        Ok(())
    }

    /// Stored tasks grouped by pod instance name.
    pub fn pods(&self) -> Result<BTreeMap<String, Vec<TaskInfo>>, SchedulerError> {
        let mut pods: BTreeMap<String, Vec<TaskInfo>> = BTreeMap::new();
        for task in self.store.fetch_tasks()? {
            pods.entry(task.pod_instance_name()).or_default().push(task);
        }
        Ok(pods)
    }

    /// Tasks of one pod instance, or `None` if nothing of it is stored.
    pub fn pod_tasks(&self, pod_name: &str) -> Result<Option<Vec<PodTask>>, SchedulerError> {
        let Some(tasks) = self.pods()?.remove(pod_name) else {
            return Ok(None);
        };
        tasks
            .into_iter()
            .map(|info| {
                Ok(PodTask {
                    status: self.store.fetch_status(&info.name)?,
                    goal_override: self.store.fetch_goal_override_status(&info.name)?,
                    info,
                })
            })
            .collect::<Result<Vec<_>, SchedulerError>>()
            .map(Some)
    }

    /// Kills every task of a pod instance so that recovery relaunches it.
    ///
    /// A `Permanent` restart first flags the tasks as permanently failed, so
    /// the pod comes back on freshly reserved resources and its current
    /// reservations are released. Returns the killed task names, or `None`
    /// for an unknown pod.
    #[instrument(skip(self))]
    pub fn restart_pod(
        &mut self,
        pod_name: &str,
        recovery_type: RecoveryType,
    ) -> Result<Option<Vec<String>>, SchedulerError> {
        let Some(mut tasks) = self.pods()?.remove(pod_name) else {
            return Ok(None);
        };
        if recovery_type == RecoveryType::Permanent {
            for task in &mut tasks {
                task.permanently_failed = true;
            }
            self.store.store_tasks(&tasks)?;
        }

        info!(tasks = tasks.len(), ?recovery_type, "Restarting pod by operator request");
        for task in &tasks {
            self.killer.kill(&task.task_id);
        }
        self.update_offer_interest();
        Ok(Some(tasks.into_iter().map(|t| t.name).collect()))
    }

    /// Periodic housekeeping between offer batches.
    pub fn tick(&mut self) {
        self.refresh_decommission();
        self.update_offer_interest();
    }

    /// Rebuilds the decommission plan unless one is still running.
    fn refresh_decommission(&mut self) {
        let running = self
            .coordinator
            .plan(DECOMMISSION_PLAN_NAME)
            .is_some_and(|p| !p.is_complete());
        if running {
            return;
        }
        if let Err(e) = self.rebuild_decommission() {
            warn!(error = %e, "Failed to refresh decommission plan");
        }
    }

    fn rebuild_decommission(&mut self) -> Result<(), SchedulerError> {
        let factory = DecommissionPlanFactory::new(self.store.clone(), self.killer.clone());
        match factory.build(&self.spec)? {
            Some(plan) => {
                info!(pods = plan.phases().len(), "Decommission plan ready");
                self.coordinator
                    .replace_manager(Box::new(DefaultPlanManager::new(plan)));
            }
            None => {
                let cancelled = self
                    .coordinator
                    .plan(DECOMMISSION_PLAN_NAME)
                    .is_some_and(|p| !p.is_complete());
                if cancelled {
                    info!("Decommission no longer needed, removing plan");
                    self.coordinator.remove_manager(DECOMMISSION_PLAN_NAME);
                }
            }
        }
        Ok(())
    }

    /// Suppresses or revives offers when outstanding work appears or runs out.
    fn update_offer_interest(&mut self) {
        if !self.is_registered() {
            return;
        }
        let suppress = !self.coordinator.has_operations();
        if self.suppressed == Some(suppress) {
            return;
        }
        if suppress {
            self.driver.suppress();
        } else {
            self.driver.revive();
        }
        self.suppressed = Some(suppress);
    }

    pub fn plans(&self) -> impl Iterator<Item = &Plan> {
        self.coordinator.plans()
    }

    pub fn plan_names(&self) -> Vec<String> {
        self.plans().map(|p| p.name().to_string()).collect()
    }

    pub fn plan(&self, name: &str) -> Option<&Plan> {
        self.coordinator.plan(name)
    }

    pub fn plan_mut(&mut self, name: &str) -> Option<&mut Plan> {
        self.coordinator.plan_mut(name)
    }

    /// Re-evaluates offer interest after an operator changed a plan.
    pub fn plans_changed(&mut self) {
        self.update_offer_interest();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverCall, RecordingDriver};
    use crate::plan::Status;
    use crate::spec::fixtures;
    use crate::store::{MemoryStateStore, StateStoreError};
    use keel_cluster::TaskInfo;

    /// Store whose framework ID write always fails.
    struct BrokenStore(MemoryStateStore);

    impl StateStore for BrokenStore {
        fn store_tasks(&self, tasks: &[TaskInfo]) -> Result<(), StateStoreError> {
            self.0.store_tasks(tasks)
        }
        fn fetch_tasks(&self) -> Result<Vec<TaskInfo>, StateStoreError> {
            self.0.fetch_tasks()
        }
        fn fetch_task(&self, name: &str) -> Result<Option<TaskInfo>, StateStoreError> {
            self.0.fetch_task(name)
        }
        fn store_status(&self, name: &str, status: &TaskStatus) -> Result<(), StateStoreError> {
            self.0.store_status(name, status)
        }
        fn fetch_status(&self, name: &str) -> Result<Option<TaskStatus>, StateStoreError> {
            self.0.fetch_status(name)
        }
        fn fetch_goal_override_status(
            &self,
            name: &str,
        ) -> Result<crate::store::GoalOverrideStatus, StateStoreError> {
            self.0.fetch_goal_override_status(name)
        }
        fn store_goal_override_status(
            &self,
            name: &str,
            status: crate::store::GoalOverrideStatus,
        ) -> Result<(), StateStoreError> {
            self.0.store_goal_override_status(name, status)
        }
        fn clear_task(&self, name: &str) -> Result<(), StateStoreError> {
            self.0.clear_task(name)
        }
        fn fetch_framework_id(&self) -> Result<Option<FrameworkId>, StateStoreError> {
            self.0.fetch_framework_id()
        }
        fn store_framework_id(&self, _id: FrameworkId) -> Result<(), StateStoreError> {
            Err(StateStoreError::Invalid("read-only".to_string()))
        }
        fn fetch_target_config(&self) -> Result<Option<String>, StateStoreError> {
            self.0.fetch_target_config()
        }
        fn store_target_config(&self, config_id: &str) -> Result<(), StateStoreError> {
            self.0.store_target_config(config_id)
        }
    }

    fn scheduler() -> (Scheduler, Arc<RecordingDriver>) {
        let driver = Arc::new(RecordingDriver::new());
        let scheduler = Scheduler::new(
            fixtures::service(vec![fixtures::pod("node", 2)]),
            Arc::new(MemoryStateStore::new()),
            driver.clone(),
            SchedulerOptions::default(),
        )
        .unwrap();
        (scheduler, driver)
    }

    #[test]
    fn test_initial_plans() {
        let (scheduler, _) = scheduler();
        assert_eq!(scheduler.plan_names(), vec!["deploy", "recovery"]);
        assert_eq!(scheduler.plan("deploy").unwrap().status(), Status::Pending);
        assert!(!scheduler.is_registered());
    }

    #[test]
    fn test_registration_failure_is_fatal() {
        let mut scheduler = Scheduler::new(
            fixtures::service(vec![fixtures::pod("node", 1)]),
            Arc::new(BrokenStore(MemoryStateStore::new())),
            Arc::new(RecordingDriver::new()),
            SchedulerOptions::default(),
        )
        .unwrap();
        let err = scheduler.register(FrameworkId::new()).unwrap_err();
        assert!(err.is_fatal());
        assert!(!scheduler.is_registered());
    }

    #[test]
    fn test_revive_then_suppress_on_transitions() {
        let (mut scheduler, driver) = scheduler();
        scheduler.register(FrameworkId::new()).unwrap();
        assert_eq!(driver.take(), vec![DriverCall::Revive]);

        scheduler.tick();
        assert!(driver.take().is_empty());

        scheduler.plan_mut("deploy").unwrap().force_complete();
        scheduler.plans_changed();
        assert_eq!(driver.take(), vec![DriverCall::Suppress]);
    }

    #[test]
    fn test_unused_offers_declined() {
        let (mut scheduler, driver) = scheduler();
        scheduler.register(FrameworkId::new()).unwrap();
        driver.take();

        let offer = Offer {
            id: OfferId::new(),
            agent_id: keel_id::AgentId::new(),
            hostname: "tiny".to_string(),
            resources: vec![],
        };
        assert!(scheduler.process_offers(vec![offer.clone()]).is_empty());
        assert_eq!(
            driver.take(),
            vec![DriverCall::Decline {
                offer_ids: vec![offer.id]
            }]
        );
    }
}

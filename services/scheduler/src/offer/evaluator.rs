//! Matching pod requirements against offers.

use std::collections::HashSet;
use std::sync::Arc;

use keel_cluster::{Offer, OfferRecommendation, Resource, TaskInfo};
use keel_id::{ResourceId, TaskId};
use tracing::debug;

use super::OfferError;
use crate::plan::{PodInstanceRequirement, RecoveryType};
use crate::spec::TaskSpec;
use crate::store::StateStore;

/// Produces the operations satisfying a requirement from a set of offers.
///
/// An empty result means no offer fits; the step is retried on a later batch.
pub trait OfferEvaluator: Send + Sync {
    fn evaluate(
        &self,
        requirement: &PodInstanceRequirement,
        offers: &[Offer],
    ) -> Result<Vec<OfferRecommendation>, OfferError>;
}

/// Matches scalar `cpus`, `mem` and `disk` requests.
///
/// Relaunches reuse the pod's existing reservations unless the recovery is
/// permanent; everything else reserves fresh resources on the first offer
/// large enough for the whole requirement.
pub struct ScalarOfferEvaluator {
    store: Arc<dyn StateStore>,
}

impl ScalarOfferEvaluator {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    fn task_spec<'a>(
        requirement: &'a PodInstanceRequirement,
        name: &str,
    ) -> Result<&'a TaskSpec, OfferError> {
        requirement
            .pod()
            .spec
            .task(name)
            .ok_or_else(|| OfferError::UnknownTask(requirement.pod().task_name(name)))
    }

    fn task_info(
        requirement: &PodInstanceRequirement,
        spec: &TaskSpec,
        offer: &Offer,
        resources: Vec<Resource>,
        config_id: &str,
    ) -> Result<TaskInfo, OfferError> {
        let pod = requirement.pod();
        let name = pod.task_name(&spec.name);
        let task_id =
            TaskId::new(name.clone()).map_err(|_| OfferError::UnknownTask(name.clone()))?;
        Ok(TaskInfo {
            name,
            task_id,
            agent_id: Some(offer.agent_id),
            pod_type: pod.pod_type().to_string(),
            pod_index: pod.index,
            task_spec: spec.name.clone(),
            resources,
            target_config: config_id.to_string(),
            environment: requirement.environment().clone(),
            permanently_failed: false,
        })
    }

    /// Relaunch on the offer carrying every reservation of the tasks.
    fn relaunch(
        &self,
        requirement: &PodInstanceRequirement,
        existing: &[TaskInfo],
        offers: &[Offer],
        config_id: &str,
    ) -> Result<Vec<OfferRecommendation>, OfferError> {
        let wanted: HashSet<ResourceId> = existing
            .iter()
            .flat_map(|t| t.resources.iter().filter_map(|r| r.id))
            .collect();

        let Some(offer) = offers.iter().find(|offer| {
            let offered: HashSet<ResourceId> = offer.reserved().filter_map(|r| r.id).collect();
            wanted.is_subset(&offered)
        }) else {
            debug!(requirement = %requirement.name(), "No offer carries the pod's reservations");
            return Ok(Vec::new());
        };

        let mut recommendations = Vec::with_capacity(existing.len());
        for task in existing {
            let spec = Self::task_spec(requirement, &task.task_spec)?;
            let info = Self::task_info(requirement, spec, offer, task.resources.clone(), config_id)?;
            recommendations.push(OfferRecommendation::Launch {
                offer_id: offer.id,
                task: Box::new(info),
                transient: false,
            });
        }
        Ok(recommendations)
    }

    /// Reserve fresh resources for every task on the first offer that fits.
    fn reserve(
        &self,
        requirement: &PodInstanceRequirement,
        offers: &[Offer],
        config_id: &str,
    ) -> Result<Vec<OfferRecommendation>, OfferError> {
        let specs = requirement
            .tasks_to_launch()
            .iter()
            .map(|t| Self::task_spec(requirement, t))
            .collect::<Result<Vec<_>, _>>()?;

        let cpus: f64 = specs.iter().map(|s| s.cpus).sum();
        let mem: f64 = specs.iter().map(|s| s.memory_mb).sum();
        let disk: f64 = specs
            .iter()
            .map(|s| s.disk_mb + s.volume.as_ref().map_or(0.0, |v| v.size_mb))
            .sum();

        let Some(offer) = offers.iter().find(|o| {
            o.unreserved("cpus") >= cpus && o.unreserved("mem") >= mem && o.unreserved("disk") >= disk
        }) else {
            debug!(
                requirement = %requirement.name(),
                cpus,
                mem,
                disk,
                "No offer large enough"
            );
            return Ok(Vec::new());
        };

        let mut recommendations = Vec::new();
        let mut reserve = |name: &str, value: f64, resources: &mut Vec<Resource>| {
            let resource = Resource::reserved(ResourceId::new(), name, value);
            recommendations.push(OfferRecommendation::Reserve {
                offer_id: offer.id,
                resource: resource.clone(),
            });
            resources.push(resource);
        };

        let mut launches = Vec::with_capacity(specs.len());
        for spec in &specs {
            let mut resources = Vec::new();
            reserve("cpus", spec.cpus, &mut resources);
            reserve("mem", spec.memory_mb, &mut resources);
            if spec.disk_mb > 0.0 {
                reserve("disk", spec.disk_mb, &mut resources);
            }
            if let Some(volume) = &spec.volume {
                reserve("disk", volume.size_mb, &mut resources);
                if let Some(last) = resources.last_mut() {
                    last.volume = Some(volume.path.clone());
                }
            }
            launches.push((spec, resources));
        }

        for (_, resources) in &launches {
            for resource in resources.iter().filter(|r| r.volume.is_some()) {
                recommendations.push(OfferRecommendation::CreateVolume {
                    offer_id: offer.id,
                    resource: resource.clone(),
                });
            }
        }

        for (spec, resources) in launches {
            let info = Self::task_info(requirement, spec, offer, resources, config_id)?;
            recommendations.push(OfferRecommendation::Launch {
                offer_id: offer.id,
                task: Box::new(info),
                transient: false,
            });
        }

        // Tasks of the pod that stay down follow it to the new agent.
        for spec in &requirement.pod().spec.tasks {
            if requirement.tasks_to_launch().contains(&spec.name) {
                continue;
            }
            if let Some(mut task) = self.store.fetch_task(&requirement.pod().task_name(&spec.name))? {
                task.agent_id = Some(offer.agent_id);
                recommendations.push(OfferRecommendation::Launch {
                    offer_id: offer.id,
                    task: Box::new(task),
                    transient: true,
                });
            }
        }

        Ok(recommendations)
    }
}

impl OfferEvaluator for ScalarOfferEvaluator {
    fn evaluate(
        &self,
        requirement: &PodInstanceRequirement,
        offers: &[Offer],
    ) -> Result<Vec<OfferRecommendation>, OfferError> {
        let config_id = self
            .store
            .fetch_target_config()?
            .ok_or(OfferError::NoTargetConfig)?;

        if requirement.recovery_type() != RecoveryType::Permanent {
            let mut existing = Vec::new();
            for name in requirement.task_names() {
                match self.store.fetch_task(&name)? {
                    Some(task) if task.resources.iter().any(Resource::is_reserved) => {
                        existing.push(task)
                    }
                    _ => break,
                }
            }
            if existing.len() == requirement.tasks_to_launch().len() {
                return self.relaunch(requirement, &existing, offers, &config_id);
            }
        }

        self.reserve(requirement, offers, &config_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PodInstance;
    use crate::spec::{fixtures, GoalState, VolumeSpec};
    use crate::store::MemoryStateStore;
    use keel_id::{AgentId, OfferId};

    fn offer(cpus: f64, mem: f64, disk: f64) -> Offer {
        Offer {
            id: OfferId::new(),
            agent_id: AgentId::new(),
            hostname: "agent-1".to_string(),
            resources: vec![
                Resource::unreserved("cpus", cpus),
                Resource::unreserved("mem", mem),
                Resource::unreserved("disk", disk),
            ],
        }
    }

    fn store() -> Arc<MemoryStateStore> {
        let store = Arc::new(MemoryStateStore::new());
        store.store_target_config("cfg").unwrap();
        store
    }

    fn requirement() -> PodInstanceRequirement {
        let mut pod = fixtures::pod("node", 1);
        pod.tasks[0].volume = Some(VolumeSpec {
            path: "data".to_string(),
            size_mb: 100.0,
        });
        pod.tasks.push(fixtures::task("init", GoalState::Once));
        PodInstanceRequirement::new(
            PodInstance { spec: pod, index: 0 },
            vec!["server".to_string(), "init".to_string()],
        )
        .unwrap()
    }

    fn launches(recs: &[OfferRecommendation]) -> Vec<&TaskInfo> {
        recs.iter()
            .filter_map(|r| match r {
                OfferRecommendation::Launch { task, .. } => Some(&**task),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_fresh_reservation() {
        let evaluator = ScalarOfferEvaluator::new(store());
        let small = offer(0.5, 128.0, 0.0);
        let big = offer(4.0, 4096.0, 1000.0);

        let recs = evaluator
            .evaluate(&requirement(), &[small, big.clone()])
            .unwrap();
        assert!(recs.iter().all(|r| r.offer_id() == big.id));

        let reserves = recs
            .iter()
            .filter(|r| matches!(r, OfferRecommendation::Reserve { .. }))
            .count();
        assert_eq!(reserves, 5);
        assert_eq!(
            recs.iter()
                .filter(|r| matches!(r, OfferRecommendation::CreateVolume { .. }))
                .count(),
            1
        );

        let tasks = launches(&recs);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].name, "node-0-server");
        assert_eq!(tasks[0].resources.len(), 3);
        assert_eq!(tasks[0].target_config, "cfg");
        assert_eq!(tasks[0].agent_id, Some(big.agent_id));
    }

    #[test]
    fn test_nothing_fits() {
        let evaluator = ScalarOfferEvaluator::new(store());
        let recs = evaluator
            .evaluate(&requirement(), &[offer(0.5, 128.0, 0.0)])
            .unwrap();
        assert!(recs.is_empty());
    }

    #[test]
    fn test_transient_relaunch_reuses_reservations() {
        let store = store();
        let evaluator = ScalarOfferEvaluator::new(store.clone());
        let req = requirement();

        let first = evaluator
            .evaluate(&req, &[offer(4.0, 4096.0, 1000.0)])
            .unwrap();
        let tasks: Vec<TaskInfo> = launches(&first).into_iter().cloned().collect();
        store.store_tasks(&tasks).unwrap();

        let reserved: Vec<Resource> = tasks.iter().flat_map(|t| t.resources.clone()).collect();
        let mut same_agent = offer(0.0, 0.0, 0.0);
        same_agent.resources.extend(reserved);

        let req = req.with_recovery_type(RecoveryType::Transient);
        let recs = evaluator
            .evaluate(&req, &[offer(4.0, 4096.0, 1000.0), same_agent.clone()])
            .unwrap();
        assert!(recs
            .iter()
            .all(|r| matches!(r, OfferRecommendation::Launch { .. })));
        let relaunched = launches(&recs);
        assert_eq!(relaunched.len(), 2);
        assert_eq!(relaunched[0].resources, tasks[0].resources);
        assert_ne!(relaunched[0].task_id, tasks[0].task_id);
        assert!(recs.iter().all(|r| r.offer_id() == same_agent.id));
    }

    #[test]
    fn test_permanent_recovery_reserves_again() {
        let store = store();
        let evaluator = ScalarOfferEvaluator::new(store.clone());
        let req = requirement();
        let first = evaluator
            .evaluate(&req, &[offer(4.0, 4096.0, 1000.0)])
            .unwrap();
        let tasks: Vec<TaskInfo> = launches(&first).into_iter().cloned().collect();
        store.store_tasks(&tasks).unwrap();

        let req = req.with_recovery_type(RecoveryType::Permanent);
        let recs = evaluator
            .evaluate(&req, &[offer(4.0, 4096.0, 1000.0)])
            .unwrap();
        assert!(recs
            .iter()
            .any(|r| matches!(r, OfferRecommendation::Reserve { .. })));
    }

    #[test]
    fn test_requires_target_config() {
        let evaluator = ScalarOfferEvaluator::new(Arc::new(MemoryStateStore::new()));
        assert!(matches!(
            evaluator.evaluate(&requirement(), &[]),
            Err(OfferError::NoTargetConfig)
        ));
    }
}

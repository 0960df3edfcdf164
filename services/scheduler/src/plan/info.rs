//! Serializable views of the plan tree.

use keel_id::{PhaseId, PlanId, StepId};
use serde::{Deserialize, Serialize};

use super::{Element, Phase, Plan, Status, Step};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub id: StepId,
    pub name: String,
    pub status: Status,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl StepInfo {
    pub fn from_step(step: &dyn Step) -> Self {
        Self {
            id: step.id(),
            name: step.name().to_string(),
            status: step.status(),
            message: step.message(),
            errors: step.errors().to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseInfo {
    pub id: PhaseId,
    pub name: String,
    pub status: Status,
    pub strategy: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub steps: Vec<StepInfo>,
}

impl PhaseInfo {
    pub fn from_phase(phase: &Phase) -> Self {
        Self {
            id: phase.id(),
            name: phase.name().to_string(),
            status: phase.status(),
            strategy: phase.strategy_name().to_string(),
            errors: phase.errors().to_vec(),
            steps: phase
                .steps()
                .iter()
                .map(|s| StepInfo::from_step(s.as_ref()))
                .collect(),
        }
    }
}

/// Full plan tree as returned by the plans API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanInfo {
    pub id: PlanId,
    pub name: String,
    pub status: Status,
    pub strategy: String,
    /// Errors of the plan and of every element below it.
    #[serde(default)]
    pub errors: Vec<String>,
    pub phases: Vec<PhaseInfo>,
}

impl PlanInfo {
    pub fn from_plan(plan: &Plan) -> Self {
        Self {
            id: plan.id(),
            name: plan.name().to_string(),
            status: plan.status(),
            strategy: plan.strategy_name().to_string(),
            errors: plan.all_errors(),
            phases: plan.phases().iter().map(PhaseInfo::from_phase).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::DeployPlanFactory;
    use crate::spec::fixtures;
    use crate::store::MemoryStateStore;

    #[test]
    fn test_plan_info_json() {
        let store = MemoryStateStore::new();
        let spec = fixtures::service(vec![fixtures::pod("data", 2)]);
        let plan = DeployPlanFactory::new(&store).build(&spec, "cfg").unwrap();

        let info = PlanInfo::from_plan(&plan);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["name"], "deploy");
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["strategy"], "serial");
        assert_eq!(json["phases"][0]["steps"][1]["name"], "data-1");
        assert!(json["phases"][0]["steps"][0].get("errors").is_none());
        assert!(json["phases"][0]["id"].as_str().unwrap().starts_with("phase_"));
    }
}

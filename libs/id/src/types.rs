//! Prefixed identifiers for scheduler and cluster objects.

use crate::define_id;

// Plan tree
define_id!(PlanId, "plan");
define_id!(PhaseId, "phase");
define_id!(StepId, "step");

// Cluster manager
define_id!(FrameworkId, "fw");
define_id!(OfferId, "offer");
define_id!(AgentId, "agent");
define_id!(ResourceId, "res");

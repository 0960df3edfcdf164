//! Offers, resources and the operations proposed against them.

use keel_id::{AgentId, OfferId, ResourceId};
use serde::{Deserialize, Serialize};

use crate::TaskInfo;

/// A scalar resource, optionally reserved for this framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Reservation ID; `None` for unreserved resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ResourceId>,
    /// `cpus`, `mem` or `disk`.
    pub name: String,
    pub value: f64,
    /// Persistent volume ID when this disk resource backs a volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
}

impl Resource {
    pub fn unreserved(name: impl Into<String>, value: f64) -> Self {
        Self {
            id: None,
            name: name.into(),
            value,
            volume: None,
        }
    }

    pub fn reserved(id: ResourceId, name: impl Into<String>, value: f64) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
            value,
            volume: None,
        }
    }

    pub fn is_reserved(&self) -> bool {
        self.id.is_some()
    }
}

/// Resources advertised on one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub agent_id: AgentId,
    pub hostname: String,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl Offer {
    /// Total unreserved amount of the named scalar.
    pub fn unreserved(&self, name: &str) -> f64 {
        self.resources
            .iter()
            .filter(|r| !r.is_reserved() && r.name == name)
            .map(|r| r.value)
            .sum()
    }

    /// Reserved resources in this offer.
    pub fn reserved(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(|r| r.is_reserved())
    }
}

/// An operation the scheduler wants to perform with an offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OfferRecommendation {
    Reserve {
        offer_id: OfferId,
        resource: Resource,
    },
    Unreserve {
        offer_id: OfferId,
        resource: Resource,
    },
    CreateVolume {
        offer_id: OfferId,
        resource: Resource,
    },
    DestroyVolume {
        offer_id: OfferId,
        resource: Resource,
    },
    Launch {
        offer_id: OfferId,
        task: Box<TaskInfo>,
        /// Transient launches only update bookkeeping and are never sent.
        transient: bool,
    },
}

impl OfferRecommendation {
    pub fn offer_id(&self) -> OfferId {
        match self {
            Self::Reserve { offer_id, .. }
            | Self::Unreserve { offer_id, .. }
            | Self::CreateVolume { offer_id, .. }
            | Self::DestroyVolume { offer_id, .. }
            | Self::Launch { offer_id, .. } => *offer_id,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Launch { transient: true, .. })
    }

    /// The resource this operation releases, if it releases one.
    pub fn released_resource(&self) -> Option<&Resource> {
        match self {
            Self::Unreserve { resource, .. } | Self::DestroyVolume { resource, .. } => {
                Some(resource)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer() -> Offer {
        Offer {
            id: OfferId::new(),
            agent_id: AgentId::new(),
            hostname: "host-1".to_string(),
            resources: vec![
                Resource::unreserved("cpus", 2.0),
                Resource::unreserved("cpus", 1.5),
                Resource::reserved(ResourceId::new(), "cpus", 1.0),
                Resource::unreserved("mem", 1024.0),
            ],
        }
    }

    #[test]
    fn test_unreserved_sums_only_unreserved() {
        let offer = offer();
        assert_eq!(offer.unreserved("cpus"), 3.5);
        assert_eq!(offer.unreserved("disk"), 0.0);
        assert_eq!(offer.reserved().count(), 1);
    }

    #[test]
    fn test_recommendation_tagging() {
        let offer = offer();
        let rec = OfferRecommendation::Unreserve {
            offer_id: offer.id,
            resource: offer.resources[2].clone(),
        };
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["type"], "unreserve");
        assert_eq!(rec.offer_id(), offer.id);
        assert!(rec.released_resource().is_some());
        assert!(!rec.is_transient());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::Location;
use crate::models::proposal::MatchProposal;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchAccepted {
    pub match_id: Uuid,
    pub driver_id: String,
    pub passenger_id: String,
    pub driver_location: Location,
    pub passenger_location: Location,
    pub target_location: Option<Location>,
    pub accepted_at: DateTime<Utc>,
}

impl From<&MatchProposal> for MatchAccepted {
    fn from(proposal: &MatchProposal) -> Self {
        Self {
            match_id: proposal.id,
            driver_id: proposal.driver_id.clone(),
            passenger_id: proposal.passenger_id.clone(),
            driver_location: proposal.driver_location,
            passenger_location: proposal.passenger_location,
            target_location: proposal.target_location,
            accepted_at: proposal.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveRide {
    pub actor_id: String,
    pub ride_id: Option<String>,
}

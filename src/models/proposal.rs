use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::actor::ActorRole;
use crate::models::location::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Pending,
    DriverConfirmed,
    PassengerConfirmed,
    Accepted,
    Rejected,
}

impl MatchStatus {
    pub const OPEN: [MatchStatus; 3] = [
        MatchStatus::Pending,
        MatchStatus::DriverConfirmed,
        MatchStatus::PassengerConfirmed,
    ];

    /// Status implied by the confirmation flags. `Rejected` is never derived.
    pub fn from_flags(driver_confirmed: bool, passenger_confirmed: bool) -> Self {
        match (driver_confirmed, passenger_confirmed) {
            (false, false) => MatchStatus::Pending,
            (true, false) => MatchStatus::DriverConfirmed,
            (false, true) => MatchStatus::PassengerConfirmed,
            (true, true) => MatchStatus::Accepted,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MatchStatus::Accepted | MatchStatus::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Pending => "PENDING",
            MatchStatus::DriverConfirmed => "DRIVER_CONFIRMED",
            MatchStatus::PassengerConfirmed => "PASSENGER_CONFIRMED",
            MatchStatus::Accepted => "ACCEPTED",
            MatchStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(MatchStatus::Pending),
            "DRIVER_CONFIRMED" => Ok(MatchStatus::DriverConfirmed),
            "PASSENGER_CONFIRMED" => Ok(MatchStatus::PassengerConfirmed),
            "ACCEPTED" => Ok(MatchStatus::Accepted),
            "REJECTED" => Ok(MatchStatus::Rejected),
            other => Err(format!("unknown match status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchProposal {
    pub id: Uuid,
    pub driver_id: String,
    pub passenger_id: String,
    pub driver_location: Location,
    pub passenger_location: Location,
    pub target_location: Option<Location>,
    pub status: MatchStatus,
    pub driver_confirmed: bool,
    pub passenger_confirmed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MatchProposal {
    pub fn party(&self, role: ActorRole) -> &str {
        match role {
            ActorRole::Driver => &self.driver_id,
            ActorRole::Passenger => &self.passenger_id,
        }
    }

    pub fn has_confirmed(&self, role: ActorRole) -> bool {
        match role {
            ActorRole::Driver => self.driver_confirmed,
            ActorRole::Passenger => self.passenger_confirmed,
        }
    }

    pub fn flags_after_confirming(&self, role: ActorRole) -> (bool, bool) {
        match role {
            ActorRole::Driver => (true, self.passenger_confirmed),
            ActorRole::Passenger => (self.driver_confirmed, true),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMatchProposal {
    pub driver_id: String,
    pub passenger_id: String,
    pub driver_location: Location,
    pub passenger_location: Location,
    pub target_location: Option<Location>,
}

impl NewMatchProposal {
    pub fn into_proposal(self, id: Uuid, now: DateTime<Utc>) -> MatchProposal {
        MatchProposal {
            id,
            driver_id: self.driver_id,
            passenger_id: self.passenger_id,
            driver_location: self.driver_location,
            passenger_location: self.passenger_location,
            target_location: self.target_location,
            status: MatchStatus::Pending,
            driver_confirmed: false,
            passenger_confirmed: false,
            created_at: now,
            updated_at: now,
        }
    }
}

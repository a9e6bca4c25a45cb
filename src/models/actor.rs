use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Driver,
    Passenger,
}

impl ActorRole {
    pub const ALL: [ActorRole; 2] = [ActorRole::Driver, ActorRole::Passenger];

    pub fn from_is_driver(is_driver: bool) -> Self {
        if is_driver {
            ActorRole::Driver
        } else {
            ActorRole::Passenger
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActorRole::Driver => "driver",
            ActorRole::Passenger => "passenger",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub mod cache;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::actor::ActorRole;
use crate::registry::cache::TtlCache;

pub const DEFAULT_ACTIVE_RIDE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

fn binding_key(role: ActorRole, actor_id: &str) -> String {
    format!("active_ride:{role}:{actor_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnbindOutcome {
    pub driver_cleared: bool,
    pub passenger_cleared: bool,
}

impl UnbindOutcome {
    pub fn is_complete(&self) -> bool {
        self.driver_cleared && self.passenger_cleared
    }
}

pub struct ActiveRideRegistry {
    cache: Arc<dyn TtlCache>,
    default_ttl: Duration,
}

impl ActiveRideRegistry {
    pub fn new(cache: Arc<dyn TtlCache>, default_ttl: Duration) -> Self {
        Self { cache, default_ttl }
    }

    pub async fn bind(
        &self,
        driver_id: &str,
        passenger_id: &str,
        ride_id: &str,
        ttl: Option<Duration>,
    ) -> Result<(), AppError> {
        if ride_id.trim().is_empty() {
            return Err(AppError::BadRequest("ride id cannot be empty".to_string()));
        }
        let ttl = ttl.unwrap_or(self.default_ttl);

        for (role, actor_id) in [
            (ActorRole::Driver, driver_id),
            (ActorRole::Passenger, passenger_id),
        ] {
            if let Err(err) = self
                .cache
                .set_with_ttl(&binding_key(role, actor_id), ride_id, ttl)
                .await
            {
                warn!(%role, actor_id, ride_id, error = %err, "active ride write failed");
                return Err(err.into());
            }
        }

        info!(driver_id, passenger_id, ride_id, ttl_secs = ttl.as_secs(), "active ride bound");
        Ok(())
    }

    /// Best-effort removal of both bindings. Failures are logged and
    /// reported in the outcome, never returned.
    pub async fn unbind(&self, driver_id: &str, passenger_id: &str) -> UnbindOutcome {
        let driver_cleared = self.clear(ActorRole::Driver, driver_id).await;
        let passenger_cleared = self.clear(ActorRole::Passenger, passenger_id).await;

        let outcome = UnbindOutcome {
            driver_cleared,
            passenger_cleared,
        };
        if outcome.is_complete() {
            info!(driver_id, passenger_id, "active ride unbound");
        }
        outcome
    }

    async fn clear(&self, role: ActorRole, actor_id: &str) -> bool {
        match self.cache.delete(&binding_key(role, actor_id)).await {
            Ok(_) => true,
            Err(err) => {
                warn!(%role, actor_id, error = %err, "failed to clear active ride; will need another unbind");
                false
            }
        }
    }

    pub async fn lookup_by_driver(&self, driver_id: &str) -> Result<Option<String>, AppError> {
        self.lookup(ActorRole::Driver, driver_id).await
    }

    pub async fn lookup_by_passenger(
        &self,
        passenger_id: &str,
    ) -> Result<Option<String>, AppError> {
        self.lookup(ActorRole::Passenger, passenger_id).await
    }

    pub async fn lookup(&self, role: ActorRole, actor_id: &str) -> Result<Option<String>, AppError> {
        Ok(self.cache.get(&binding_key(role, actor_id)).await?)
    }
}

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::engine::coordinator::MatchCoordinator;
use crate::geo::cache::{GeoCache, MemoryGeoCache};
use crate::geo::index::GeospatialIndex;
use crate::models::actor::ActorRole;
use crate::models::ride::MatchAccepted;
use crate::observability::metrics::Metrics;
use crate::registry::cache::{MemoryTtlCache, TtlCache};
use crate::registry::{ActiveRideRegistry, DEFAULT_ACTIVE_RIDE_TTL};
use crate::store::memory::MemoryMatchStore;
use crate::store::MatchStore;

pub struct Backends {
    pub store: Arc<dyn MatchStore>,
    pub geo_cache: Arc<dyn GeoCache>,
    pub ride_cache: Arc<dyn TtlCache>,
    pub clock: Arc<dyn Clock>,
}

impl Backends {
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Arc::new(MemoryMatchStore::new(clock.clone())),
            geo_cache: Arc::new(MemoryGeoCache::new()),
            ride_cache: Arc::new(MemoryTtlCache::new(clock.clone())),
            clock,
        }
    }
}

impl Default for Backends {
    fn default() -> Self {
        Self::in_memory(Arc::new(SystemClock))
    }
}

#[derive(Debug, Clone)]
pub struct StateOptions {
    pub event_buffer_size: usize,
    pub active_ride_ttl: Duration,
    pub default_search_radius_km: f64,
}

impl Default for StateOptions {
    fn default() -> Self {
        Self {
            event_buffer_size: 1024,
            active_ride_ttl: DEFAULT_ACTIVE_RIDE_TTL,
            default_search_radius_km: 5.0,
        }
    }
}

impl From<&Config> for StateOptions {
    fn from(config: &Config) -> Self {
        Self {
            event_buffer_size: config.event_buffer_size,
            active_ride_ttl: config.active_ride_ttl,
            default_search_radius_km: config.default_search_radius_km,
        }
    }
}

pub struct AppState {
    pub geo: GeospatialIndex,
    pub coordinator: MatchCoordinator,
    pub rides: ActiveRideRegistry,
    pub accepted_tx: mpsc::Sender<MatchAccepted>,
    pub match_events_tx: broadcast::Sender<MatchAccepted>,
    pub metrics: Metrics,
    pub default_search_radius_km: f64,
}

impl AppState {
    pub fn new(
        backends: Backends,
        options: StateOptions,
    ) -> (Self, mpsc::Receiver<MatchAccepted>) {
        let (accepted_tx, accepted_rx) = mpsc::channel(options.event_buffer_size);
        let (match_events_tx, _unused_rx) = broadcast::channel(options.event_buffer_size);
        let metrics = Metrics::new();

        (
            Self {
                geo: GeospatialIndex::new(backends.geo_cache, backends.clock),
                coordinator: MatchCoordinator::new(backends.store, metrics.clone()),
                rides: ActiveRideRegistry::new(backends.ride_cache, options.active_ride_ttl),
                accepted_tx,
                match_events_tx,
                metrics,
                default_search_radius_km: options.default_search_radius_km,
            },
            accepted_rx,
        )
    }

    pub async fn refresh_pool_gauge(&self, pool: ActorRole) {
        match self.geo.pool_size(pool).await {
            Ok(size) => self
                .metrics
                .available_actors
                .with_label_values(&[pool.as_str()])
                .set(size as i64),
            Err(err) => warn!(%pool, error = %err, "failed to read pool size"),
        }
    }
}

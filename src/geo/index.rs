use std::cmp::Ordering;
use std::sync::Arc;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{AppError, CacheError};
use crate::geo::cache::GeoCache;
use crate::models::actor::ActorRole;
use crate::models::location::Location;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyActor {
    pub id: String,
    pub distance_km: f64,
}

pub struct GeospatialIndex {
    cache: Arc<dyn GeoCache>,
    clock: Arc<dyn Clock>,
}

fn positions_key(pool: ActorRole) -> String {
    format!("geo:{pool}")
}

fn available_key(pool: ActorRole) -> String {
    format!("available:{pool}")
}

fn locations_key(pool: ActorRole) -> String {
    format!("location:{pool}")
}

impl GeospatialIndex {
    pub fn new(cache: Arc<dyn GeoCache>, clock: Arc<dyn Clock>) -> Self {
        Self { cache, clock }
    }

    pub async fn add_available(
        &self,
        pool: ActorRole,
        actor_id: &str,
        location: Location,
    ) -> Result<(), AppError> {
        if actor_id.trim().is_empty() {
            return Err(AppError::BadRequest("actor id cannot be empty".to_string()));
        }
        if !location.is_finite() {
            return Err(AppError::BadRequest(
                "location coordinates must be finite".to_string(),
            ));
        }

        // Staleness is judged on receipt time, never on the caller's clock.
        let location = location.observed_at(self.clock.now());

        self.cache
            .geo_add(&positions_key(pool), actor_id, location)
            .await?;

        let marked = async {
            self.cache.set_add(&available_key(pool), actor_id).await?;
            self.cache
                .hash_set(&locations_key(pool), actor_id, location)
                .await
        }
        .await;

        if let Err(err) = marked {
            warn!(%pool, actor_id, error = %err, "availability write failed; undoing partial entry");
            self.remove_entries(pool, actor_id).await;
            return Err(err.into());
        }

        debug!(%pool, actor_id, lat = location.lat, lng = location.lng, "actor available");
        Ok(())
    }

    pub async fn remove_available(&self, pool: ActorRole, actor_id: &str) -> Result<(), AppError> {
        match self.remove_entries(pool, actor_id).await {
            Some(err) => Err(err.into()),
            None => {
                debug!(%pool, actor_id, "actor unavailable");
                Ok(())
            }
        }
    }

    async fn remove_entries(&self, pool: ActorRole, actor_id: &str) -> Option<CacheError> {
        // Availability flag goes first so a half-removed actor is never searchable.
        let results = [
            self.cache
                .set_remove(&available_key(pool), actor_id)
                .await
                .map(|_| ()),
            self.cache
                .geo_remove(&positions_key(pool), actor_id)
                .await
                .map(|_| ()),
            self.cache
                .hash_delete(&locations_key(pool), actor_id)
                .await
                .map(|_| ()),
        ];

        let mut first_err = None;
        for result in results {
            if let Err(err) = result {
                warn!(%pool, actor_id, error = %err, "availability removal step failed");
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
        first_err
    }

    pub async fn find_nearby(
        &self,
        pool: ActorRole,
        center: &Location,
        radius_km: f64,
    ) -> Result<Vec<NearbyActor>, AppError> {
        if !center.is_finite() {
            return Err(AppError::BadRequest(
                "search center must be finite".to_string(),
            ));
        }
        if !radius_km.is_finite() || radius_km < 0.0 {
            return Err(AppError::BadRequest(format!(
                "radius must be a non-negative number, got {radius_km}"
            )));
        }

        let hits = self
            .cache
            .geo_radius(&positions_key(pool), center, radius_km)
            .await?;
        let available = self.cache.set_members(&available_key(pool)).await?;

        let mut nearby: Vec<NearbyActor> = hits
            .into_iter()
            .filter(|(id, _)| available.contains(id))
            .map(|(id, distance_km)| NearbyActor { id, distance_km })
            .collect();

        nearby.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(nearby)
    }

    pub async fn last_known_location(
        &self,
        pool: ActorRole,
        actor_id: &str,
    ) -> Result<Location, AppError> {
        self.cache
            .hash_get(&locations_key(pool), actor_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no location for {pool} {actor_id}")))
    }

    pub async fn pool_size(&self, pool: ActorRole) -> Result<usize, AppError> {
        Ok(self.cache.set_members(&available_key(pool)).await?.len())
    }

    pub async fn prune_stale(
        &self,
        pool: ActorRole,
        max_age: TimeDelta,
    ) -> Result<Vec<String>, AppError> {
        let cutoff = self.clock.now() - max_age;
        let entries = self.cache.hash_entries(&locations_key(pool)).await?;

        let mut pruned = Vec::new();
        for (actor_id, location) in entries {
            let is_stale = location.timestamp.is_none_or(|seen| seen < cutoff);
            if !is_stale {
                continue;
            }
            match self.remove_entries(pool, &actor_id).await {
                None => pruned.push(actor_id),
                Some(err) => warn!(%pool, %actor_id, error = %err, "failed to prune stale actor"),
            }
        }

        if !pruned.is_empty() {
            info!(%pool, count = pruned.len(), "pruned stale availability entries");
        }
        Ok(pruned)
    }
}

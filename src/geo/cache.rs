use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

use crate::error::CacheError;
use crate::geo::haversine_km;
use crate::models::location::Location;

#[async_trait]
pub trait GeoCache: Send + Sync {
    async fn geo_add(&self, key: &str, member: &str, location: Location) -> Result<(), CacheError>;

    async fn geo_remove(&self, key: &str, member: &str) -> Result<bool, CacheError>;

    async fn geo_radius(
        &self,
        key: &str,
        center: &Location,
        radius_km: f64,
    ) -> Result<Vec<(String, f64)>, CacheError>;

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, CacheError>;

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, CacheError>;

    async fn set_members(&self, key: &str) -> Result<HashSet<String>, CacheError>;

    async fn hash_set(&self, key: &str, field: &str, value: Location) -> Result<(), CacheError>;

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Location>, CacheError>;

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, CacheError>;

    async fn hash_entries(&self, key: &str) -> Result<Vec<(String, Location)>, CacheError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeoOp {
    GeoAdd,
    GeoRemove,
    GeoRadius,
    SetAdd,
    SetRemove,
    SetMembers,
    HashSet,
    HashGet,
    HashDelete,
    HashEntries,
}

#[derive(Default)]
pub struct MemoryGeoCache {
    positions: DashMap<String, HashMap<String, Location>>,
    sets: DashMap<String, HashSet<String>>,
    hashes: DashMap<String, HashMap<String, Location>>,
    offline: AtomicBool,
    failing: DashSet<GeoOp>,
}

impl MemoryGeoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fail_on(&self, op: GeoOp) {
        self.failing.insert(op);
    }

    pub fn recover(&self, op: GeoOp) {
        self.failing.remove(&op);
    }

    fn check(&self, op: GeoOp) -> Result<(), CacheError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("geo cache offline".to_string()));
        }
        if self.failing.contains(&op) {
            return Err(CacheError::Unavailable(format!("{op:?} failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl GeoCache for MemoryGeoCache {
    async fn geo_add(&self, key: &str, member: &str, location: Location) -> Result<(), CacheError> {
        self.check(GeoOp::GeoAdd)?;
        self.positions
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), location);
        Ok(())
    }

    async fn geo_remove(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        self.check(GeoOp::GeoRemove)?;
        Ok(self
            .positions
            .get_mut(key)
            .map(|mut members| members.remove(member).is_some())
            .unwrap_or(false))
    }

    async fn geo_radius(
        &self,
        key: &str,
        center: &Location,
        radius_km: f64,
    ) -> Result<Vec<(String, f64)>, CacheError> {
        self.check(GeoOp::GeoRadius)?;
        let Some(members) = self.positions.get(key) else {
            return Ok(Vec::new());
        };

        Ok(members
            .iter()
            .filter_map(|(member, location)| {
                let distance = haversine_km(center, location);
                (distance <= radius_km).then(|| (member.clone(), distance))
            })
            .collect())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        self.check(GeoOp::SetAdd)?;
        Ok(self
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        self.check(GeoOp::SetRemove)?;
        Ok(self
            .sets
            .get_mut(key)
            .map(|mut members| members.remove(member))
            .unwrap_or(false))
    }

    async fn set_members(&self, key: &str) -> Result<HashSet<String>, CacheError> {
        self.check(GeoOp::SetMembers)?;
        Ok(self
            .sets
            .get(key)
            .map(|members| members.clone())
            .unwrap_or_default())
    }

    async fn hash_set(&self, key: &str, field: &str, value: Location) -> Result<(), CacheError> {
        self.check(GeoOp::HashSet)?;
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Location>, CacheError> {
        self.check(GeoOp::HashGet)?;
        Ok(self
            .hashes
            .get(key)
            .and_then(|fields| fields.get(field).copied()))
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, CacheError> {
        self.check(GeoOp::HashDelete)?;
        Ok(self
            .hashes
            .get_mut(key)
            .map(|mut fields| fields.remove(field).is_some())
            .unwrap_or(false))
    }

    async fn hash_entries(&self, key: &str) -> Result<Vec<(String, Location)>, CacheError> {
        self.check(GeoOp::HashEntries)?;
        Ok(self
            .hashes
            .get(key)
            .map(|fields| {
                fields
                    .iter()
                    .map(|(field, location)| (field.clone(), *location))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::{GeoCache, GeoOp, MemoryGeoCache};
    use crate::models::location::Location;

    #[tokio::test]
    async fn radius_search_excludes_far_members() {
        let cache = MemoryGeoCache::new();
        let center = Location::new(52.52, 13.405);
        cache.geo_add("geo", "near", Location::new(52.521, 13.405)).await.unwrap();
        cache.geo_add("geo", "far", Location::new(52.60, 13.405)).await.unwrap();

        let hits = cache.geo_radius("geo", &center, 1.0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "near");
    }

    #[tokio::test]
    async fn removing_unknown_members_reports_false() {
        let cache = MemoryGeoCache::new();
        assert!(!cache.geo_remove("geo", "ghost").await.unwrap());
        assert!(!cache.set_remove("set", "ghost").await.unwrap());
        assert!(!cache.hash_delete("hash", "ghost").await.unwrap());
    }

    #[tokio::test]
    async fn injected_failures_surface_as_unavailable() {
        let cache = MemoryGeoCache::new();
        cache.fail_on(GeoOp::SetAdd);
        assert!(cache.set_add("set", "a").await.is_err());
        cache.recover(GeoOp::SetAdd);
        assert!(cache.set_add("set", "a").await.unwrap());

        cache.set_offline(true);
        assert!(cache.set_members("set").await.is_err());
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::{DashMap, DashSet};

use crate::clock::Clock;
use crate::error::CacheError;

#[async_trait]
pub trait TtlCache: Send + Sync {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
}

struct CacheEntry {
    value: String,
    // None when the TTL overflows the calendar; effectively never expires.
    expires_at: Option<DateTime<Utc>>,
}

pub struct MemoryTtlCache {
    entries: DashMap<String, CacheEntry>,
    clock: Arc<dyn Clock>,
    offline: AtomicBool,
    failing_keys: DashSet<String>,
}

impl MemoryTtlCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            offline: AtomicBool::new(false),
            failing_keys: DashSet::new(),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fail_key(&self, key: &str) {
        self.failing_keys.insert(key.to_string());
    }

    pub fn recover_key(&self, key: &str) {
        self.failing_keys.remove(key);
    }

    pub fn raw_len(&self) -> usize {
        self.entries.len()
    }

    fn check(&self, key: &str) -> Result<(), CacheError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("ttl cache offline".to_string()));
        }
        if self.failing_keys.contains(key) {
            return Err(CacheError::Unavailable(format!("write to {key} failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl TtlCache for MemoryTtlCache {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.check(key)?;
        let expires_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl));

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("ttl cache offline".to_string()));
        }

        let now = self.clock.now();
        let live = match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) => entry
                .expires_at
                .is_none_or(|at| at > now)
                .then(|| entry.value.clone()),
        };

        if live.is_none() {
            self.entries
                .remove_if(key, |_, entry| entry.expires_at.is_some_and(|at| at <= now));
        }
        Ok(live)
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.check(key)?;
        Ok(self.entries.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::TimeDelta;

    use super::{MemoryTtlCache, TtlCache};
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let clock = Arc::new(ManualClock::default());
        let cache = MemoryTtlCache::new(clock.clone());
        cache
            .set_with_ttl("k", "v", Duration::from_secs(60))
            .await
            .unwrap();

        clock.advance(TimeDelta::seconds(59));
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        clock.advance(TimeDelta::seconds(1));
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.raw_len(), 0);
    }

    #[tokio::test]
    async fn huge_ttl_never_expires() {
        let clock = Arc::new(ManualClock::default());
        let cache = MemoryTtlCache::new(clock.clone());
        cache.set_with_ttl("k", "v", Duration::MAX).await.unwrap();

        clock.advance(TimeDelta::days(3650));
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
    }
}

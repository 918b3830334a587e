//! Time-bounded read-through cache

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::db::{CacheRepository, SqliteCacheRepository, Store};
use crate::error::Result;
use crate::models::CacheEntry;
use crate::util::now_ms;

/// Cache manager over the persistence store
///
/// Eviction is lazy: an expired entry behaves as absent on read and the read
/// sweeps all expired entries as a side effect. There is no eviction timer.
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<Mutex<Store>>,
    default_ttl: Duration,
}

impl CacheManager {
    /// Create a manager with the given default time-to-live
    pub fn new(store: Arc<Mutex<Store>>, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    /// Store a value under `key`, expiring `ttl` (or the default) from now
    pub async fn put(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let entry = CacheEntry::new(key, value, ttl.unwrap_or(self.default_ttl));
        let mut store = self.store.lock().await;
        store.with_transaction(|tx| SqliteCacheRepository::new(tx).put(&entry))
    }

    /// Get a value by key; expired entries behave as absent and trigger a
    /// sweep of everything past expiry
    pub async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let now = now_ms();
        let mut store = self.store.lock().await;

        let entry = SqliteCacheRepository::new(store.connection()).get(key)?;
        match entry {
            Some(entry) if !entry.is_expired(now) => Ok(Some(entry.payload)),
            Some(_) => {
                let evicted = store
                    .with_transaction(|tx| SqliteCacheRepository::new(tx).delete_expired(now))?;
                tracing::debug!(key, evicted, "cache read past expiry, swept stale entries");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Sweep every entry past expiry; returns the number evicted
    pub async fn evict_expired(&self) -> Result<usize> {
        let now = now_ms();
        let mut store = self.store.lock().await;
        store.with_transaction(|tx| SqliteCacheRepository::new(tx).delete_expired(now))
    }
}

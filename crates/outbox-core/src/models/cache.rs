//! Cache entry model

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::now_ms;

/// A time-bounded local copy of previously fetched data
///
/// Invariant: `expires_at > stored_at`. A read past expiry behaves as absent
/// and schedules lazy eviction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Unique cache key
    pub key: String,
    /// Opaque cached value
    pub payload: serde_json::Value,
    /// Write timestamp (Unix ms)
    pub stored_at: i64,
    /// Expiry timestamp (Unix ms)
    pub expires_at: i64,
}

impl CacheEntry {
    /// Create an entry expiring `ttl` from now
    #[must_use]
    pub fn new(key: impl Into<String>, payload: serde_json::Value, ttl: Duration) -> Self {
        let stored_at = now_ms();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        Self {
            key: key.into(),
            payload,
            stored_at,
            expires_at: stored_at.saturating_add(ttl_ms.max(1)),
        }
    }

    /// Whether the entry has expired at the given instant
    #[must_use]
    pub const fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

//! Engine configuration.
//!
//! All values have safe defaults; `from_env` lets deployments override them
//! through `OUTBOX_*` variables without touching code.

use std::time::Duration;

use crate::util::normalize_text_option;

/// Default time-to-live for cache entries (24 hours)
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default delivery attempts before an operation becomes failed
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default bound on a single network request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables for the sync engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Time-to-live applied by `cache_data` when the caller gives none
    pub cache_ttl: Duration,
    /// Delivery attempts before an operation is marked failed
    pub max_retries: u32,
    /// Bound applied to every outgoing request
    pub request_timeout: Duration,
    /// Base URL of the server's per-entity version endpoints
    pub version_base_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            version_base_url: None,
        }
    }
}

impl EngineConfig {
    /// Build a configuration from `OUTBOX_*` environment variables,
    /// falling back to defaults for anything unset or unparsable
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = env_u64("OUTBOX_CACHE_TTL_SECS") {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(retries) = env_u64("OUTBOX_MAX_RETRIES") {
            config.max_retries = u32::try_from(retries).unwrap_or(DEFAULT_MAX_RETRIES);
        }
        if let Some(secs) = env_u64("OUTBOX_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }
        config.version_base_url =
            normalize_text_option(std::env::var("OUTBOX_VERSION_BASE_URL").ok());

        config
    }
}

fn env_u64(name: &str) -> Option<u64> {
    normalize_text_option(std::env::var(name).ok())?.parse().ok()
}

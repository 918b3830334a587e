//! Authoritative server-version lookups for conflict detection.
//!
//! The server is expected to expose, for every entity resource, a sibling
//! version endpoint: `GET {base}/{entity_type}/{entity_id}/version` returning
//! `{"version": n}`, and `GET {base}/{entity_type}/{entity_id}` for a fresh
//! snapshot. Endpoints are derived from the configured base URL, never
//! inferred from an operation's resource URL.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::EntityKey;
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// Trait for querying the server's view of an entity (async)
///
/// `hint_url` is the queued operation's target URL, passed through for
/// implementations that route by resource; the HTTP implementation ignores it.
#[allow(async_fn_in_trait)]
pub trait VersionOracle {
    /// Current server-side version for the entity
    async fn remote_version(&self, entity: &EntityKey, hint_url: &str) -> Result<i64>;

    /// Fresh snapshot of the entity's server state, when available
    async fn fetch_snapshot(
        &self,
        entity: &EntityKey,
        hint_url: &str,
    ) -> Result<Option<serde_json::Value>>;
}

/// HTTP implementation of the version-check contract
#[derive(Clone)]
pub struct HttpVersionOracle {
    base_url: Option<String>,
    client: reqwest::Client,
}

impl HttpVersionOracle {
    /// Create an oracle for the given base URL
    ///
    /// `base_url = None` leaves the oracle unconfigured: every probe fails,
    /// which callers treat as "no conflict detectable".
    pub fn new(base_url: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = match normalize_text_option(base_url) {
            Some(url) if is_http_url(&url) => Some(url.trim_end_matches('/').to_string()),
            Some(url) => {
                return Err(Error::InvalidInput(format!(
                    "version base URL must include http:// or https://: {url}"
                )))
            }
            None => None,
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(Self { base_url, client })
    }

    fn entity_url(&self, entity: &EntityKey) -> Result<String> {
        let base = self
            .base_url
            .as_deref()
            .ok_or_else(|| Error::Transport("version oracle is not configured".to_string()))?;
        Ok(format!("{base}/{}/{}", entity.entity_type, entity.entity_id))
    }
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: i64,
}

impl VersionOracle for HttpVersionOracle {
    async fn remote_version(&self, entity: &EntityKey, _hint_url: &str) -> Result<i64> {
        let url = format!("{}/version", self.entity_url(entity)?);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "version probe for {entity} returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let payload = response
            .json::<VersionResponse>()
            .await
            .map_err(|e| Error::Transport(compact_text(&e.to_string())))?;
        Ok(payload.version)
    }

    async fn fetch_snapshot(
        &self,
        entity: &EntityKey,
        _hint_url: &str,
    ) -> Result<Option<serde_json::Value>> {
        let url = self.entity_url(entity)?;
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(serde_json::from_str(&body).ok())
    }
}

//! Shared test doubles for the network seams

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::models::EntityKey;
use crate::oracle::VersionOracle;
use crate::transport::{HttpRequest, HttpResponse, Transport};

/// Scripted transport that records every request it is asked to send
#[derive(Clone)]
pub struct MockTransport {
    response: Arc<dyn Fn() -> Result<HttpResponse> + Send + Sync>,
    sent: Arc<Mutex<Vec<HttpRequest>>>,
}

impl MockTransport {
    fn scripted(response: impl Fn() -> Result<HttpResponse> + Send + Sync + 'static) -> Self {
        Self {
            response: Arc::new(response),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every request succeeds with an empty 200
    pub fn ok() -> Self {
        Self::status(200, "")
    }

    /// Every request yields the given status and body
    pub fn status(status: u16, body: &str) -> Self {
        let body = body.to_string();
        Self::scripted(move || {
            Ok(HttpResponse {
                status,
                body: body.clone(),
            })
        })
    }

    /// Every request fails at the transport level
    pub fn failing(message: &str) -> Self {
        let message = message.to_string();
        Self::scripted(move || Err(Error::Transport(message.clone())))
    }

    /// Requests recorded so far, in send order
    pub fn sent(&self) -> Vec<HttpRequest> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.sent.lock().unwrap().push(request.clone());
        (self.response)()
    }
}

/// Scripted version oracle with per-entity versions and snapshots
///
/// Unknown entities report version 0; `failing` makes every probe error the
/// way an unreachable server would.
#[derive(Clone, Default)]
pub struct MockOracle {
    versions: HashMap<EntityKey, i64>,
    snapshots: HashMap<EntityKey, serde_json::Value>,
    fail: bool,
}

impl MockOracle {
    /// Every probe fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Script the server-side version of an entity
    #[must_use]
    pub fn with_version(mut self, entity: EntityKey, version: i64) -> Self {
        self.versions.insert(entity, version);
        self
    }

    /// Script the server-side snapshot of an entity
    #[must_use]
    pub fn with_snapshot(mut self, entity: EntityKey, snapshot: serde_json::Value) -> Self {
        self.snapshots.insert(entity, snapshot);
        self
    }
}

impl VersionOracle for MockOracle {
    async fn remote_version(&self, entity: &EntityKey, _hint_url: &str) -> Result<i64> {
        if self.fail {
            return Err(Error::Transport("probe unreachable".to_string()));
        }
        Ok(self.versions.get(entity).copied().unwrap_or(0))
    }

    async fn fetch_snapshot(
        &self,
        entity: &EntityKey,
        _hint_url: &str,
    ) -> Result<Option<serde_json::Value>> {
        if self.fail {
            return Err(Error::Transport("probe unreachable".to_string()));
        }
        Ok(self.snapshots.get(entity).cloned())
    }
}

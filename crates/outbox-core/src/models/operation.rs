//! Queued sync operation model

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::version::EntityKey;
use crate::util::now_ms;

/// A unique identifier for a queued operation, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Create a new unique operation ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// HTTP method carried by a queued operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Wire representation of the method
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Parse from a wire representation, case-insensitively
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a queued operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Waiting for the next dispatch pass
    Pending,
    /// Currently being dispatched
    Processing,
    /// Delivered and acknowledged by the server
    Completed,
    /// Retries exhausted
    Failed,
    /// Blocked on a pending conflict record
    Conflict,
    /// Mooted by a sibling operation's success on the same entity
    Superseded,
}

impl OperationStatus {
    /// Storage representation of the status
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Conflict => "conflict",
            Self::Superseded => "superseded",
        }
    }

    /// Parse from a storage representation
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "conflict" => Some(Self::Conflict),
            "superseded" => Some(Self::Superseded),
            _ => None,
        }
    }

    /// Terminal statuses are immutable except for audit fields
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Superseded)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable record of one queued mutating network request awaiting dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    /// Unique identifier, assigned on enqueue and stable for the lifetime
    pub id: OperationId,
    /// Request target URL
    pub target_url: String,
    /// Request method
    pub method: HttpMethod,
    /// Serialized request payload
    pub body: Option<serde_json::Value>,
    /// Request headers
    pub headers: HashMap<String, String>,
    /// Enqueue timestamp (Unix ms)
    pub created_at: i64,
    /// Current lifecycle status
    pub status: OperationStatus,
    /// Number of delivery attempts that failed so far
    pub retry_count: u32,
    /// Error text of the most recent failed attempt
    pub last_error: Option<String>,
    /// Domain object this operation mutates, when known
    pub entity: Option<EntityKey>,
    /// Entity version the client believed current when the write was queued
    pub entity_version_at_creation: Option<i64>,
    /// Server response body captured on completion
    pub server_snapshot: Option<serde_json::Value>,
    /// Completion timestamp (Unix ms)
    pub completed_at: Option<i64>,
}

impl SyncOperation {
    /// Create a new pending operation for the given request
    #[must_use]
    pub fn new(
        target_url: impl Into<String>,
        method: HttpMethod,
        body: Option<serde_json::Value>,
        headers: HashMap<String, String>,
    ) -> Self {
        Self {
            id: OperationId::new(),
            target_url: target_url.into(),
            method,
            body,
            headers,
            created_at: now_ms(),
            status: OperationStatus::Pending,
            retry_count: 0,
            last_error: None,
            entity: None,
            entity_version_at_creation: None,
            server_snapshot: None,
            completed_at: None,
        }
    }

    /// Attach entity identity and the version baseline recorded at enqueue
    #[must_use]
    pub fn with_entity(mut self, entity: EntityKey, baseline_version: i64) -> Self {
        self.entity = Some(entity);
        self.entity_version_at_creation = Some(baseline_version);
        self
    }
}

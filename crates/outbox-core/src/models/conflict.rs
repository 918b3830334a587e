//! Conflict record model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::operation::{OperationId, SyncOperation};
use crate::models::version::EntityKey;
use crate::util::now_ms;

/// A unique identifier for a conflict record, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictId(Uuid);

impl ConflictId {
    /// Create a new unique conflict ID using UUID v7
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

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConflictId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Arbitration state of a conflict record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    /// Awaiting arbitration
    Pending,
    /// Arbitrated; this transition is one-way
    Resolved,
}

impl ConflictStatus {
    /// Storage representation of the status
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
        }
    }

    /// Parse from a storage representation
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

/// How a conflict was arbitrated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Re-submit the client's queued payload against the server version
    Client,
    /// Accept the server's value as-is, nothing is re-sent
    Server,
    /// Re-submit caller-supplied data in place of the queued payload
    Manual,
}

impl Resolution {
    /// Storage representation of the resolution
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Server => "server",
            Self::Manual => "manual",
        }
    }

    /// Parse from a storage representation
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "client" => Some(Self::Client),
            "server" => Some(Self::Server),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A captured disagreement between a queued client write and newer server
/// state, pending arbitration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Unique identifier
    pub id: ConflictId,
    /// Entity the disagreement is about
    pub entity: EntityKey,
    /// The queued operation that tripped the version check
    pub source_operation_id: OperationId,
    /// Server-side version discovered at dispatch time
    pub server_version: i64,
    /// Version the client's write was queued against
    pub client_version: i64,
    /// Snapshot of the entity fetched from the server, when available
    pub server_data: Option<serde_json::Value>,
    /// The operation's intended payload
    pub client_data: Option<serde_json::Value>,
    /// Arbitration state
    pub status: ConflictStatus,
    /// How the conflict was arbitrated, once resolved
    pub resolution: Option<Resolution>,
    /// The value the arbitration settled on
    pub resolved_data: Option<serde_json::Value>,
    /// Detection timestamp (Unix ms)
    pub created_at: i64,
    /// Arbitration timestamp (Unix ms)
    pub resolved_at: Option<i64>,
}

impl ConflictRecord {
    /// Create a pending conflict record for an operation whose baseline is
    /// behind the discovered server version
    #[must_use]
    pub fn new(
        operation: &SyncOperation,
        entity: EntityKey,
        server_version: i64,
        server_data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: ConflictId::new(),
            entity,
            source_operation_id: operation.id,
            server_version,
            client_version: operation.entity_version_at_creation.unwrap_or(0),
            server_data,
            client_data: operation.body.clone(),
            status: ConflictStatus::Pending,
            resolution: None,
            resolved_data: None,
            created_at: now_ms(),
            resolved_at: None,
        }
    }
}

//! Per-entity version counters for optimistic concurrency detection

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a domain object tracked by the version table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    /// Logical type name, e.g. `"Note"`
    pub entity_type: String,
    /// Identifier within the type
    pub entity_id: String,
}

impl EntityKey {
    /// Create a key from an entity type and id
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

/// One row of the entity-version table
///
/// `version` starts at 0 and only ever increases; it never resets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityVersion {
    /// Entity this counter belongs to
    pub key: EntityKey,
    /// Monotonically increasing version counter
    pub version: i64,
    /// Last local modification timestamp (Unix ms)
    pub last_modified_at: i64,
    /// Timestamp of the last confirmed sync with the server (Unix ms)
    pub last_synced_at: Option<i64>,
}

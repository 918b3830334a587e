//! Offline scratch record model

use serde::{Deserialize, Serialize};

/// Locally created data with no server identity yet, e.g. a draft written
/// while disconnected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineRecord {
    /// Row identifier assigned by the store
    pub id: i64,
    /// Logical collection name chosen by the caller
    pub store_name: String,
    /// Opaque payload
    pub payload: serde_json::Value,
    /// Insertion timestamp (Unix ms)
    pub inserted_at: i64,
}

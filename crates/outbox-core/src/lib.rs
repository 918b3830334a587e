//! outbox-core - Core library for Outbox
//!
//! This crate contains the durable operation queue, version tracking,
//! conflict arbitration, TTL cache, and offline store used by all Outbox
//! interfaces.

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod models;
pub mod oracle;
pub mod services;
pub mod sync;
pub mod transport;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use models::{
    ConflictId, ConflictRecord, EntityKey, HttpMethod, OperationId, OperationStatus, Resolution,
    SyncOperation,
};
pub use services::SyncEngine;
pub use sync::DispatchSummary;

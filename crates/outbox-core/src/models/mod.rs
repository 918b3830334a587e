//! Data models for the sync engine

mod cache;
mod conflict;
mod offline;
mod operation;
mod version;

pub use cache::CacheEntry;
pub use conflict::{ConflictId, ConflictRecord, ConflictStatus, Resolution};
pub use offline::OfflineRecord;
pub use operation::{HttpMethod, OperationId, OperationStatus, SyncOperation};
pub use version::{EntityKey, EntityVersion};

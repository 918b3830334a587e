//! Persistence layer for Outbox

mod cache_repository;
mod conflict_repository;
mod connection;
mod migrations;
mod queue_repository;
mod version_repository;

pub use cache_repository::{
    CacheRepository, OfflineRepository, SqliteCacheRepository, SqliteOfflineRepository,
};
pub use conflict_repository::{ConflictRepository, SqliteConflictRepository};
pub use connection::Store;
pub use queue_repository::{OperationRepository, SqliteOperationRepository};
pub use version_repository::{SqliteVersionRepository, VersionRepository};

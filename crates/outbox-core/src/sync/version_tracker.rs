//! Entity version tracker

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{SqliteVersionRepository, Store, VersionRepository};
use crate::error::Result;
use crate::models::{EntityKey, EntityVersion};

/// Per-entity monotonic version counters over the persistence store
///
/// Composite writes that must be atomic with queue updates (enqueue stamping,
/// dispatch confirmation, resolution) run inside the queue's own
/// transactions; this type serves callers that only need the counters.
#[derive(Clone)]
pub struct EntityVersionTracker {
    store: Arc<Mutex<Store>>,
}

impl EntityVersionTracker {
    /// Create a tracker over the shared store
    pub fn new(store: Arc<Mutex<Store>>) -> Self {
        Self { store }
    }

    /// Full version row for an entity, if tracked
    pub async fn get(&self, key: &EntityKey) -> Result<Option<EntityVersion>> {
        let store = self.store.lock().await;
        SqliteVersionRepository::new(store.connection()).get(key)
    }

    /// Current version for an entity, defaulting to 0 when untracked
    pub async fn current(&self, key: &EntityKey) -> Result<i64> {
        let store = self.store.lock().await;
        SqliteVersionRepository::new(store.connection()).current(key)
    }

    /// Increment the entity's counter by one; returns the new version
    pub async fn bump(&self, key: &EntityKey) -> Result<i64> {
        let mut store = self.store.lock().await;
        store.with_transaction(|tx| SqliteVersionRepository::new(tx).bump(key))
    }

    /// Raise the entity's counter to `version` unless already higher
    pub async fn advance_to(&self, key: &EntityKey, version: i64, synced: bool) -> Result<i64> {
        let mut store = self.store.lock().await;
        store.with_transaction(|tx| SqliteVersionRepository::new(tx).advance_to(key, version, synced))
    }
}

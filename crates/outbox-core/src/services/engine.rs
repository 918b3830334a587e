//! Sync engine facade
//!
//! One handle wiring the queue, cache, conflict arbitration, offline store,
//! and connectivity monitor over a shared store. All operations are safe to
//! call from multiple tasks.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::cache::CacheManager;
use crate::config::EngineConfig;
use crate::connectivity::{ConnectivityMonitor, ConnectivityProbe, Transition};
use crate::db::{OfflineRepository, SqliteOfflineRepository, Store};
use crate::error::Result;
use crate::models::{
    ConflictId, ConflictRecord, EntityKey, EntityVersion, HttpMethod, OfflineRecord, OperationId,
    OperationStatus, Resolution, SyncOperation,
};
use crate::oracle::{HttpVersionOracle, VersionOracle};
use crate::sync::{ConflictResolver, DispatchSummary, EntityVersionTracker, SyncQueueManager};
use crate::transport::{ReqwestTransport, Transport};

/// The sync engine
pub struct SyncEngine<T, V> {
    store: Arc<Mutex<Store>>,
    queue: SyncQueueManager<T, V>,
    cache: CacheManager,
    resolver: ConflictResolver,
    versions: EntityVersionTracker,
    monitor: ConnectivityMonitor,
}

impl SyncEngine<ReqwestTransport, HttpVersionOracle> {
    /// Open an engine over the database at `path` with the default HTTP
    /// transport and version oracle
    pub fn open(
        path: impl AsRef<Path>,
        config: EngineConfig,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Result<Self> {
        let store = Store::open(path)?;
        let transport = ReqwestTransport::new(config.request_timeout)?;
        let oracle =
            HttpVersionOracle::new(config.version_base_url.clone(), config.request_timeout)?;
        Ok(Self::new(store, config, transport, oracle, probe))
    }
}

impl<T: Transport, V: VersionOracle> SyncEngine<T, V> {
    /// Create an engine over an open store with explicit network seams
    pub fn new(
        store: Store,
        config: EngineConfig,
        transport: T,
        oracle: V,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        let store = Arc::new(Mutex::new(store));
        Self {
            queue: SyncQueueManager::new(
                Arc::clone(&store),
                transport,
                oracle,
                config.max_retries,
            ),
            cache: CacheManager::new(Arc::clone(&store), config.cache_ttl),
            resolver: ConflictResolver::new(Arc::clone(&store)),
            versions: EntityVersionTracker::new(Arc::clone(&store)),
            monitor: ConnectivityMonitor::new(probe),
            store,
        }
    }

    // Queue

    /// Queue a mutating request for delivery
    pub async fn enqueue(
        &self,
        target_url: impl Into<String>,
        method: HttpMethod,
        body: Option<serde_json::Value>,
        headers: HashMap<String, String>,
        entity: Option<EntityKey>,
    ) -> Result<SyncOperation> {
        self.queue
            .enqueue(target_url, method, body, headers, entity)
            .await
    }

    /// Dispatch the pending backlog, then sweep expired cache entries
    ///
    /// Offline this reduces to reporting the backlog size.
    pub async fn sync_pending_data(&self) -> Result<DispatchSummary> {
        let online = self.monitor.is_online();
        let summary = self.queue.dispatch_all(online).await?;
        if online {
            self.cache.evict_expired().await?;
        }
        Ok(summary)
    }

    /// Whether any operation is awaiting dispatch
    pub async fn has_pending_items(&self) -> Result<bool> {
        Ok(self.queue.pending_count().await? > 0)
    }

    /// Number of operations awaiting dispatch
    pub async fn get_pending_items_count(&self) -> Result<u64> {
        self.queue.pending_count().await
    }

    /// Operations awaiting dispatch, oldest first
    pub async fn get_pending_operations(&self) -> Result<Vec<SyncOperation>> {
        self.queue.list(Some(OperationStatus::Pending)).await
    }

    /// All operations, optionally filtered by status, oldest first
    pub async fn get_operations(
        &self,
        status: Option<OperationStatus>,
    ) -> Result<Vec<SyncOperation>> {
        self.queue.list(status).await
    }

    /// Get one operation by ID
    pub async fn get_operation(&self, id: &OperationId) -> Result<Option<SyncOperation>> {
        self.queue.get(id).await
    }

    /// Put a failed operation back in line; returns whether it changed
    pub async fn retry_operation(&self, id: &OperationId) -> Result<bool> {
        self.queue.retry(id).await
    }

    /// Remove an operation from the queue; returns whether it existed
    pub async fn delete_operation(&self, id: &OperationId) -> Result<bool> {
        self.queue.delete(id).await
    }

    // Conflicts

    /// Conflicts awaiting arbitration, oldest first
    pub async fn get_conflicts(&self) -> Result<Vec<ConflictRecord>> {
        self.resolver.list_pending().await
    }

    /// Recent conflicts including resolved ones, newest first
    pub async fn get_recent_conflicts(&self, limit: usize) -> Result<Vec<ConflictRecord>> {
        self.resolver.list_recent(limit).await
    }

    /// Arbitrate a conflict; returns whether its operation was re-queued
    ///
    /// A re-queued operation gets a best-effort dispatch pass right away when
    /// the device is online.
    pub async fn resolve_conflict(
        &self,
        id: &ConflictId,
        resolution: Resolution,
        manual_data: Option<serde_json::Value>,
    ) -> Result<bool> {
        let requeued = self.resolver.resolve(id, resolution, manual_data).await?;
        if requeued && self.monitor.is_online() {
            if let Err(e) = self.queue.dispatch_all(true).await {
                tracing::warn!(conflict_id = %id, error = %e, "post-resolution dispatch failed");
            }
        }
        Ok(requeued)
    }

    // Cache

    /// Cache a value under `key`, expiring `ttl` (or the default) from now
    pub async fn cache_data(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<std::time::Duration>,
    ) -> Result<()> {
        self.cache.put(key, value, ttl).await
    }

    /// Read a cached value; expired entries behave as absent
    pub async fn get_cached_data(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.cache.get(key).await
    }

    /// Sweep expired cache entries; returns the number evicted
    pub async fn evict_expired_cache(&self) -> Result<usize> {
        self.cache.evict_expired().await
    }

    // Offline records

    /// Stash locally created data under a logical collection name
    pub async fn save_offline_data(
        &self,
        store_name: &str,
        payload: serde_json::Value,
    ) -> Result<i64> {
        let mut store = self.store.lock().await;
        store.with_transaction(|tx| {
            SqliteOfflineRepository::new(tx).insert(store_name, &payload)
        })
    }

    /// Read back a collection of offline data in insertion order
    pub async fn get_offline_data(&self, store_name: &str) -> Result<Vec<OfflineRecord>> {
        let store = self.store.lock().await;
        SqliteOfflineRepository::new(store.connection()).list(store_name)
    }

    // Versions and connectivity

    /// The tracked version row for an entity, if any
    pub async fn entity_version(&self, key: &EntityKey) -> Result<Option<EntityVersion>> {
        self.versions.get(key).await
    }

    /// Whether the connectivity probe currently reports online
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    /// Observe the connectivity probe; a reconnect edge triggers a dispatch
    /// pass for the accumulated backlog
    pub async fn poll_connectivity(&self) -> Result<Transition> {
        let transition = self.monitor.poll();
        if transition == Transition::Reconnected {
            let summary = self.sync_pending_data().await?;
            tracing::info!(
                success = summary.success,
                failed = summary.failed,
                conflicts = summary.conflicts,
                pending = summary.pending,
                "reconnected, backlog dispatched"
            );
        }
        Ok(transition)
    }
}

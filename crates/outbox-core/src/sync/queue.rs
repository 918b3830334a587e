//! Durable operation queue and dispatch loop

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    OperationRepository, SqliteOperationRepository, SqliteVersionRepository, Store,
    VersionRepository,
};
use crate::error::Result;
use crate::models::{EntityKey, HttpMethod, OperationId, OperationStatus, SyncOperation};
use crate::oracle::VersionOracle;
use crate::sync::conflict::ConflictResolver;
use crate::transport::{HttpRequest, Transport};
use crate::util::{compact_text, now_ms};

/// Outcome tally of one dispatch pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Operations delivered and acknowledged during this pass
    pub success: usize,
    /// Delivery attempts that failed during this pass
    pub failed: usize,
    /// Conflicts detected during this pass
    pub conflicts: usize,
    /// Operations still awaiting dispatch after the pass
    pub pending: u64,
}

/// Manages the durable queue of operations and their delivery
///
/// One dispatch pass runs at a time; concurrent callers of
/// [`SyncQueueManager::dispatch_all`] queue up behind the run lock instead of
/// double-sending.
pub struct SyncQueueManager<T, V> {
    store: Arc<Mutex<Store>>,
    transport: T,
    oracle: V,
    resolver: ConflictResolver,
    max_retries: u32,
    run_lock: Mutex<()>,
}

impl<T: Transport, V: VersionOracle> SyncQueueManager<T, V> {
    /// Create a queue manager over the shared store
    pub fn new(store: Arc<Mutex<Store>>, transport: T, oracle: V, max_retries: u32) -> Self {
        let resolver = ConflictResolver::new(Arc::clone(&store));
        Self {
            store,
            transport,
            oracle,
            resolver,
            max_retries,
            run_lock: Mutex::new(()),
        }
    }

    /// Enqueue a mutating request for later delivery
    ///
    /// When `entity` is given, the entity's current version is captured as the
    /// operation's baseline and the local counter advances by one, all in the
    /// same transaction as the insert.
    pub async fn enqueue(
        &self,
        target_url: impl Into<String>,
        method: HttpMethod,
        body: Option<serde_json::Value>,
        headers: HashMap<String, String>,
        entity: Option<EntityKey>,
    ) -> Result<SyncOperation> {
        let mut operation = SyncOperation::new(target_url, method, body, headers);

        let mut store = self.store.lock().await;
        let operation = store.with_transaction(move |tx| {
            if let Some(key) = entity {
                let versions = SqliteVersionRepository::new(tx);
                let baseline = versions.current(&key)?;
                versions.bump(&key)?;
                operation = operation.with_entity(key, baseline);
            }
            SqliteOperationRepository::new(tx).insert(&operation)?;
            Ok(operation)
        })?;

        tracing::debug!(
            operation_id = %operation.id,
            url = %operation.target_url,
            method = %operation.method,
            "operation queued"
        );
        Ok(operation)
    }

    /// Get an operation by ID
    pub async fn get(&self, id: &OperationId) -> Result<Option<SyncOperation>> {
        let store = self.store.lock().await;
        SqliteOperationRepository::new(store.connection()).get(id)
    }

    /// List operations, optionally filtered by status, oldest first
    pub async fn list(&self, status: Option<OperationStatus>) -> Result<Vec<SyncOperation>> {
        let store = self.store.lock().await;
        SqliteOperationRepository::new(store.connection()).list(status)
    }

    /// Count operations awaiting dispatch
    pub async fn pending_count(&self) -> Result<u64> {
        let store = self.store.lock().await;
        SqliteOperationRepository::new(store.connection()).pending_count()
    }

    /// Force a failed operation back to pending; returns whether it changed
    pub async fn retry(&self, id: &OperationId) -> Result<bool> {
        let mut store = self.store.lock().await;
        store.with_transaction(|tx| SqliteOperationRepository::new(tx).reset_failed(id))
    }

    /// Hard-remove an operation from the queue; returns whether it existed
    pub async fn delete(&self, id: &OperationId) -> Result<bool> {
        let mut store = self.store.lock().await;
        store.with_transaction(|tx| SqliteOperationRepository::new(tx).delete(id))
    }

    /// Dispatch every pending operation, oldest first
    ///
    /// When `online` is false this is a read-only no-op that still reports the
    /// pending backlog. The store lock is never held across a network call.
    pub async fn dispatch_all(&self, online: bool) -> Result<DispatchSummary> {
        let mut summary = DispatchSummary::default();

        if !online {
            summary.pending = self.pending_count().await?;
            tracing::debug!(pending = summary.pending, "offline, dispatch skipped");
            return Ok(summary);
        }

        let _pass = self.run_lock.lock().await;

        // Rows stuck in processing belong to a pass that died mid-flight;
        // they rejoin the backlog before the batch is loaded
        let batch = {
            let mut store = self.store.lock().await;
            let recovered = store
                .with_transaction(|tx| SqliteOperationRepository::new(tx).recover_processing())?;
            if recovered > 0 {
                tracing::warn!(recovered, "recovered operations from an interrupted pass");
            }
            SqliteOperationRepository::new(store.connection()).list_pending()?
        };
        tracing::info!(batch = batch.len(), "dispatch pass started");

        let mut superseded: HashSet<OperationId> = HashSet::new();
        for operation in &batch {
            if superseded.contains(&operation.id) {
                continue;
            }
            self.dispatch_one(operation.clone(), &batch, &mut superseded, &mut summary)
                .await?;
        }

        summary.pending = self.pending_count().await?;
        tracing::info!(
            success = summary.success,
            failed = summary.failed,
            conflicts = summary.conflicts,
            pending = summary.pending,
            "dispatch pass finished"
        );
        Ok(summary)
    }

    async fn dispatch_one(
        &self,
        mut operation: SyncOperation,
        batch: &[SyncOperation],
        superseded: &mut HashSet<OperationId>,
        summary: &mut DispatchSummary,
    ) -> Result<()> {
        operation.status = OperationStatus::Processing;
        {
            let mut store = self.store.lock().await;
            store.with_transaction(|tx| SqliteOperationRepository::new(tx).update(&operation))?;
        }

        // Version check before the write leaves the device
        if let Some(entity) = operation.entity.clone() {
            let baseline = operation.entity_version_at_creation.unwrap_or(0);
            let server_version = match self
                .oracle
                .remote_version(&entity, &operation.target_url)
                .await
            {
                Ok(version) => version,
                Err(e) => {
                    // An unreachable probe cannot prove a mismatch
                    tracing::warn!(
                        operation_id = %operation.id,
                        entity = %entity,
                        error = %e,
                        "version probe failed, proceeding without conflict check"
                    );
                    0
                }
            };

            if server_version > baseline {
                let snapshot = match self
                    .oracle
                    .fetch_snapshot(&entity, &operation.target_url)
                    .await
                {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        tracing::warn!(
                            operation_id = %operation.id,
                            entity = %entity,
                            error = %e,
                            "snapshot fetch failed"
                        );
                        None
                    }
                };
                self.resolver
                    .create(&operation, server_version, snapshot)
                    .await?;
                summary.conflicts += 1;
                return Ok(());
            }
        }

        let request = HttpRequest::from_operation(&operation);
        match self.transport.send(&request).await {
            Ok(response) if response.is_success() => {
                self.confirm(&mut operation, &response.body).await?;
                summary.success += 1;
                self.supersede_siblings(&operation, batch, superseded)
                    .await?;
            }
            Ok(response) => {
                let error = format!(
                    "HTTP {}: {}",
                    response.status,
                    compact_text(&response.body)
                );
                self.record_failure(&mut operation, error).await?;
                summary.failed += 1;
            }
            Err(e) => {
                self.record_failure(&mut operation, e.to_string()).await?;
                summary.failed += 1;
            }
        }
        Ok(())
    }

    /// Mark a delivered operation completed and confirm the entity version
    async fn confirm(&self, operation: &mut SyncOperation, response_body: &str) -> Result<()> {
        operation.status = OperationStatus::Completed;
        operation.completed_at = Some(now_ms());
        operation.server_snapshot = parse_snapshot(response_body);

        let mut store = self.store.lock().await;
        store.with_transaction(|tx| {
            SqliteOperationRepository::new(tx).update(operation)?;
            if let Some(entity) = &operation.entity {
                let confirmed = operation.entity_version_at_creation.unwrap_or(0) + 1;
                SqliteVersionRepository::new(tx).advance_to(entity, confirmed, true)?;
            }
            Ok(())
        })?;

        tracing::info!(operation_id = %operation.id, "operation delivered");
        Ok(())
    }

    /// First success wins: moot the remaining batch siblings of the entity
    ///
    /// The whole group supersedes in one transaction; a failure leaves no
    /// partially discarded group behind.
    async fn supersede_siblings(
        &self,
        winner: &SyncOperation,
        batch: &[SyncOperation],
        superseded: &mut HashSet<OperationId>,
    ) -> Result<()> {
        let Some(entity) = &winner.entity else {
            return Ok(());
        };

        let discarded = {
            let mut store = self.store.lock().await;
            store.with_transaction(|tx| {
                let repo = SqliteOperationRepository::new(tx);
                let mut discarded = Vec::new();
                for sibling in batch {
                    if sibling.id == winner.id || sibling.entity.as_ref() != Some(entity) {
                        continue;
                    }
                    if repo.mark_superseded(&sibling.id)? {
                        discarded.push(sibling.id);
                    }
                }
                Ok(discarded)
            })?
        };

        for id in discarded {
            superseded.insert(id);
            tracing::debug!(
                operation_id = %id,
                winner_id = %winner.id,
                entity = %entity,
                "sibling superseded"
            );
        }
        Ok(())
    }

    /// Record a failed attempt, exhausting into `failed` at the retry cap
    async fn record_failure(&self, operation: &mut SyncOperation, error: String) -> Result<()> {
        operation.retry_count += 1;
        operation.last_error = Some(error);
        operation.status = if operation.retry_count >= self.max_retries {
            OperationStatus::Failed
        } else {
            OperationStatus::Pending
        };

        let mut store = self.store.lock().await;
        store.with_transaction(|tx| SqliteOperationRepository::new(tx).update(operation))?;

        tracing::warn!(
            operation_id = %operation.id,
            retry_count = operation.retry_count,
            status = %operation.status,
            error = operation.last_error.as_deref().unwrap_or(""),
            "delivery attempt failed"
        );
        Ok(())
    }
}

/// A 2xx body is kept as the server snapshot: JSON when it parses, the raw
/// text otherwise, nothing for an empty body
fn parse_snapshot(body: &str) -> Option<serde_json::Value> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed)
        .ok()
        .or_else(|| Some(serde_json::Value::String(trimmed.to_string())))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::{ConflictRepository, SqliteConflictRepository};
    use crate::testing::{MockOracle, MockTransport};

    fn shared_store() -> Arc<Mutex<Store>> {
        Arc::new(Mutex::new(Store::open_in_memory().unwrap()))
    }

    fn manager(
        store: &Arc<Mutex<Store>>,
        transport: MockTransport,
        oracle: MockOracle,
    ) -> SyncQueueManager<MockTransport, MockOracle> {
        SyncQueueManager::new(Arc::clone(store), transport, oracle, 5)
    }

    fn note_key() -> EntityKey {
        EntityKey::new("Note", "42")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn enqueue_stamps_baseline_and_bumps_version() {
        let store = shared_store();
        let queue = manager(&store, MockTransport::ok(), MockOracle::default());

        let first = queue
            .enqueue("/api/Note/42", HttpMethod::Put, None, HashMap::new(), Some(note_key()))
            .await
            .unwrap();
        let second = queue
            .enqueue("/api/Note/42", HttpMethod::Put, None, HashMap::new(), Some(note_key()))
            .await
            .unwrap();

        assert_eq!(first.entity_version_at_creation, Some(0));
        assert_eq!(second.entity_version_at_creation, Some(1));

        let guard = store.lock().await;
        let local = SqliteVersionRepository::new(guard.connection())
            .current(&note_key())
            .unwrap();
        assert_eq!(local, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_dispatch_only_reports_backlog() {
        let store = shared_store();
        let transport = MockTransport::ok();
        let queue = manager(&store, transport.clone(), MockOracle::default());

        queue
            .enqueue("/api/Note/42", HttpMethod::Put, None, HashMap::new(), Some(note_key()))
            .await
            .unwrap();

        let summary = queue.dispatch_all(false).await.unwrap();
        assert_eq!(summary, DispatchSummary { success: 0, failed: 0, conflicts: 0, pending: 1 });
        assert_eq!(transport.sent().len(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn happy_path_completes_and_confirms_version() {
        let store = shared_store();
        let transport = MockTransport::ok();
        let queue = manager(&store, transport.clone(), MockOracle::default());

        let operation = queue
            .enqueue(
                "/api/Note/42",
                HttpMethod::Put,
                Some(serde_json::json!({"title": "x"})),
                HashMap::new(),
                Some(note_key()),
            )
            .await
            .unwrap();

        let summary = queue.dispatch_all(true).await.unwrap();
        assert_eq!(summary.success, 1);
        assert_eq!(summary.pending, 0);
        assert_eq!(transport.sent().len(), 1);

        let delivered = queue.get(&operation.id).await.unwrap().unwrap();
        assert_eq!(delivered.status, OperationStatus::Completed);
        assert!(delivered.completed_at.is_some());

        let guard = store.lock().await;
        let version = SqliteVersionRepository::new(guard.connection())
            .get(&note_key())
            .unwrap()
            .unwrap();
        assert_eq!(version.version, 1);
        assert!(version.last_synced_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stale_baseline_becomes_conflict_not_a_send() {
        let store = shared_store();
        let transport = MockTransport::ok();
        let oracle = MockOracle::default()
            .with_version(note_key(), 5)
            .with_snapshot(note_key(), serde_json::json!({"title": "remote"}));
        let queue = manager(&store, transport.clone(), oracle);

        // Client last saw version 3; the server has moved on to 5
        {
            let mut guard = store.lock().await;
            guard
                .with_transaction(|tx| {
                    SqliteVersionRepository::new(tx).advance_to(&note_key(), 3, true)
                })
                .unwrap();
        }
        let operation = queue
            .enqueue(
                "/api/Note/42",
                HttpMethod::Put,
                Some(serde_json::json!({"title": "local"})),
                HashMap::new(),
                Some(note_key()),
            )
            .await
            .unwrap();

        let summary = queue.dispatch_all(true).await.unwrap();
        assert_eq!(summary.conflicts, 1);
        assert_eq!(summary.success, 0);
        assert_eq!(transport.sent().len(), 0);

        let parked = queue.get(&operation.id).await.unwrap().unwrap();
        assert_eq!(parked.status, OperationStatus::Conflict);

        let guard = store.lock().await;
        let records = SqliteConflictRepository::new(guard.connection())
            .list_pending()
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].server_version, 5);
        assert_eq!(records[0].client_version, 3);
        assert_eq!(
            records[0].server_data,
            Some(serde_json::json!({"title": "remote"}))
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn probe_failure_falls_back_to_dispatch() {
        let store = shared_store();
        let transport = MockTransport::ok();
        let queue = manager(&store, transport.clone(), MockOracle::failing());

        queue
            .enqueue("/api/Note/42", HttpMethod::Put, None, HashMap::new(), Some(note_key()))
            .await
            .unwrap();

        let summary = queue.dispatch_all(true).await.unwrap();
        assert_eq!(summary.success, 1);
        assert_eq!(summary.conflicts, 0);
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn interrupted_pass_operations_rejoin_the_backlog() {
        let store = shared_store();
        let transport = MockTransport::ok();
        let queue = manager(&store, transport.clone(), MockOracle::default());

        let operation = queue
            .enqueue("/api/Note/42", HttpMethod::Put, None, HashMap::new(), Some(note_key()))
            .await
            .unwrap();

        // A pass that died mid-flight leaves the row in processing
        {
            let guard = store.lock().await;
            guard
                .connection()
                .execute(
                    "UPDATE sync_operations SET status = 'processing' WHERE id = ?",
                    [operation.id.as_str()],
                )
                .unwrap();
        }
        assert_eq!(queue.pending_count().await.unwrap(), 0);

        let summary = queue.dispatch_all(true).await.unwrap();
        assert_eq!(summary.success, 1);
        assert_eq!(summary.pending, 0);
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(
            queue.get(&operation.id).await.unwrap().unwrap().status,
            OperationStatus::Completed
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn first_success_supersedes_batch_siblings() {
        let store = shared_store();
        let transport = MockTransport::ok();
        let queue = manager(&store, transport.clone(), MockOracle::default());

        let winner = queue
            .enqueue("/api/Note/42", HttpMethod::Put, None, HashMap::new(), Some(note_key()))
            .await
            .unwrap();
        let sibling = queue
            .enqueue("/api/Note/42", HttpMethod::Put, None, HashMap::new(), Some(note_key()))
            .await
            .unwrap();
        let later_sibling = queue
            .enqueue("/api/Note/42", HttpMethod::Patch, None, HashMap::new(), Some(note_key()))
            .await
            .unwrap();
        let other_entity = queue
            .enqueue(
                "/api/Task/7",
                HttpMethod::Post,
                None,
                HashMap::new(),
                Some(EntityKey::new("Task", "7")),
            )
            .await
            .unwrap();

        let summary = queue.dispatch_all(true).await.unwrap();
        // The winner and the unrelated entity are sent; the siblings never are
        assert_eq!(summary.success, 2);
        assert_eq!(summary.pending, 0);
        assert_eq!(transport.sent().len(), 2);

        assert_eq!(
            queue.get(&winner.id).await.unwrap().unwrap().status,
            OperationStatus::Completed
        );
        assert_eq!(
            queue.get(&sibling.id).await.unwrap().unwrap().status,
            OperationStatus::Superseded
        );
        assert_eq!(
            queue.get(&later_sibling.id).await.unwrap().unwrap().status,
            OperationStatus::Superseded
        );
        assert_eq!(
            queue.get(&other_entity.id).await.unwrap().unwrap().status,
            OperationStatus::Completed
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failures_retry_until_the_cap() {
        let store = shared_store();
        let transport = MockTransport::status(500, "boom");
        let queue = manager(&store, transport.clone(), MockOracle::default());

        let operation = queue
            .enqueue("/api/Note/42", HttpMethod::Put, None, HashMap::new(), None)
            .await
            .unwrap();

        for attempt in 1..=4u32 {
            let summary = queue.dispatch_all(true).await.unwrap();
            assert_eq!(summary.failed, 1);
            let fetched = queue.get(&operation.id).await.unwrap().unwrap();
            assert_eq!(fetched.status, OperationStatus::Pending);
            assert_eq!(fetched.retry_count, attempt);
        }

        let summary = queue.dispatch_all(true).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.pending, 0);

        let exhausted = queue.get(&operation.id).await.unwrap().unwrap();
        assert_eq!(exhausted.status, OperationStatus::Failed);
        assert_eq!(exhausted.retry_count, 5);
        assert!(exhausted.last_error.as_deref().unwrap().contains("HTTP 500"));

        // A failed operation is no longer picked up
        let summary = queue.dispatch_all(true).await.unwrap();
        assert_eq!(summary.failed, 0);
        assert_eq!(transport.sent().len(), 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transport_errors_count_as_failed_attempts() {
        let store = shared_store();
        let transport = MockTransport::failing("connection refused");
        let queue = manager(&store, transport.clone(), MockOracle::default());

        let operation = queue
            .enqueue("/api/Note/42", HttpMethod::Put, None, HashMap::new(), None)
            .await
            .unwrap();

        let summary = queue.dispatch_all(true).await.unwrap();
        assert_eq!(summary.failed, 1);

        let fetched = queue.get(&operation.id).await.unwrap().unwrap();
        assert_eq!(fetched.retry_count, 1);
        assert!(fetched
            .last_error
            .as_deref()
            .unwrap()
            .contains("connection refused"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retry_resets_only_failed_operations() {
        let store = shared_store();
        let transport = MockTransport::status(500, "boom");
        let queue = manager(&store, transport.clone(), MockOracle::default());

        let operation = queue
            .enqueue("/api/Note/42", HttpMethod::Put, None, HashMap::new(), None)
            .await
            .unwrap();
        for _ in 0..5 {
            queue.dispatch_all(true).await.unwrap();
        }
        assert_eq!(
            queue.get(&operation.id).await.unwrap().unwrap().status,
            OperationStatus::Failed
        );

        assert!(queue.retry(&operation.id).await.unwrap());
        assert_eq!(
            queue.get(&operation.id).await.unwrap().unwrap().status,
            OperationStatus::Pending
        );
        // Already pending, nothing to reset
        assert!(!queue.retry(&operation.id).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn freestanding_operation_skips_the_version_check() {
        let store = shared_store();
        let transport = MockTransport::ok();
        // A would-be mismatch that must not matter without an entity
        let oracle = MockOracle::default().with_version(note_key(), 99);
        let queue = manager(&store, transport.clone(), oracle);

        queue
            .enqueue("/api/telemetry", HttpMethod::Post, None, HashMap::new(), None)
            .await
            .unwrap();

        let summary = queue.dispatch_all(true).await.unwrap();
        assert_eq!(summary.success, 1);
        assert_eq!(summary.conflicts, 0);
    }

    #[test]
    fn snapshot_parsing_prefers_json() {
        assert_eq!(
            parse_snapshot("{\"ok\": true}"),
            Some(serde_json::json!({"ok": true}))
        );
        assert_eq!(
            parse_snapshot("created"),
            Some(serde_json::Value::String("created".to_string()))
        );
        assert_eq!(parse_snapshot("   "), None);
    }
}

//! Conflict arbitration
//!
//! Conflicts never resolve themselves. A detected version mismatch parks the
//! operation in `conflict` status and records both sides; a caller must pick
//! the winner through [`ConflictResolver::resolve`].

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    ConflictRepository, OperationRepository, SqliteConflictRepository, SqliteOperationRepository,
    SqliteVersionRepository, Store, VersionRepository,
};
use crate::error::{Error, Result};
use crate::models::{
    ConflictId, ConflictRecord, ConflictStatus, OperationStatus, Resolution, SyncOperation,
};
use crate::util::now_ms;

/// Handles detected conflicts and their user-driven arbitration
#[derive(Clone)]
pub struct ConflictResolver {
    store: Arc<Mutex<Store>>,
}

impl ConflictResolver {
    /// Create a resolver over the shared store
    pub fn new(store: Arc<Mutex<Store>>) -> Self {
        Self { store }
    }

    /// Record a detected conflict and park its source operation
    ///
    /// The record insert and the operation's transition to `conflict` commit
    /// together, so a crash can never leave one without the other.
    pub async fn create(
        &self,
        operation: &SyncOperation,
        server_version: i64,
        server_data: Option<serde_json::Value>,
    ) -> Result<ConflictRecord> {
        let entity = operation
            .entity
            .clone()
            .ok_or_else(|| Error::InvalidInput("operation has no entity".to_string()))?;
        let record = ConflictRecord::new(operation, entity, server_version, server_data);

        let mut parked = operation.clone();
        parked.status = OperationStatus::Conflict;

        let mut store = self.store.lock().await;
        store.with_transaction(|tx| {
            SqliteConflictRepository::new(tx).insert(&record)?;
            SqliteOperationRepository::new(tx).update(&parked)?;
            Ok(())
        })?;

        tracing::info!(
            conflict_id = %record.id,
            operation_id = %operation.id,
            entity = %record.entity,
            client_version = record.client_version,
            server_version = record.server_version,
            "conflict detected"
        );
        Ok(record)
    }

    /// Get a conflict record by ID
    pub async fn get(&self, id: &ConflictId) -> Result<Option<ConflictRecord>> {
        let store = self.store.lock().await;
        SqliteConflictRepository::new(store.connection()).get(id)
    }

    /// Conflicts awaiting arbitration, oldest first
    pub async fn list_pending(&self) -> Result<Vec<ConflictRecord>> {
        let store = self.store.lock().await;
        SqliteConflictRepository::new(store.connection()).list_pending()
    }

    /// Recent conflicts including resolved ones, newest first
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<ConflictRecord>> {
        let store = self.store.lock().await;
        SqliteConflictRepository::new(store.connection()).list_recent(limit)
    }

    /// Arbitrate a pending conflict
    ///
    /// Returns whether the source operation went back to `pending` and a
    /// dispatch pass is worth running. Resolving an already-resolved conflict
    /// is a no-op that returns `false`; a missing conflict is an error.
    ///
    /// `manual_data` is required for [`Resolution::Manual`] and ignored
    /// otherwise.
    pub async fn resolve(
        &self,
        id: &ConflictId,
        resolution: Resolution,
        manual_data: Option<serde_json::Value>,
    ) -> Result<bool> {
        if resolution == Resolution::Manual && manual_data.is_none() {
            return Err(Error::InvalidInput(
                "manual resolution requires replacement data".to_string(),
            ));
        }

        let mut store = self.store.lock().await;
        let requeued = store.with_transaction(|tx| {
            let conflicts = SqliteConflictRepository::new(tx);
            let operations = SqliteOperationRepository::new(tx);

            let mut record = conflicts
                .get(id)?
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            if record.status == ConflictStatus::Resolved {
                return Ok(false);
            }

            let source = operations.get(&record.source_operation_id)?;
            let now = now_ms();

            record.status = ConflictStatus::Resolved;
            record.resolution = Some(resolution);
            record.resolved_at = Some(now);
            record.resolved_data = match resolution {
                Resolution::Server => record.server_data.clone(),
                Resolution::Client => record.client_data.clone(),
                Resolution::Manual => manual_data.clone(),
            };

            // A superseded or completed source has nothing left to re-send;
            // the record still closes for the audit trail
            let requeued = match source {
                Some(mut operation) if !operation.status.is_terminal() => match resolution {
                    Resolution::Server => {
                        operation.status = OperationStatus::Completed;
                        operation.completed_at = Some(now);
                        operation.server_snapshot = record.server_data.clone();
                        operations.update(&operation)?;
                        SqliteVersionRepository::new(tx).advance_to(
                            &record.entity,
                            record.server_version,
                            true,
                        )?;
                        false
                    }
                    Resolution::Client | Resolution::Manual => {
                        operation.body = record.resolved_data.clone();
                        operation.entity_version_at_creation = Some(record.server_version);
                        operation.status = OperationStatus::Pending;
                        operation.last_error = None;
                        operations.update(&operation)?;
                        // Records the observed server version so later enqueues
                        // baseline against it rather than the stale local counter
                        SqliteVersionRepository::new(tx).advance_to(
                            &record.entity,
                            record.server_version,
                            false,
                        )?;
                        true
                    }
                },
                _ => false,
            };

            conflicts.update(&record)?;
            Ok(requeued)
        })?;

        tracing::info!(conflict_id = %id, %resolution, requeued, "conflict resolved");
        Ok(requeued)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::{EntityKey, HttpMethod};

    fn shared_store() -> Arc<Mutex<Store>> {
        Arc::new(Mutex::new(Store::open_in_memory().unwrap()))
    }

    async fn seed_conflict(store: &Arc<Mutex<Store>>) -> (SyncOperation, ConflictRecord) {
        let operation = SyncOperation::new(
            "/api/Note/42",
            HttpMethod::Put,
            Some(serde_json::json!({"title": "local"})),
            HashMap::new(),
        )
        .with_entity(EntityKey::new("Note", "42"), 3);

        {
            let guard = store.lock().await;
            SqliteOperationRepository::new(guard.connection())
                .insert(&operation)
                .unwrap();
        }

        let resolver = ConflictResolver::new(Arc::clone(store));
        let record = resolver
            .create(&operation, 5, Some(serde_json::json!({"title": "remote"})))
            .await
            .unwrap();
        (operation, record)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_parks_operation_and_lists_pending() {
        let store = shared_store();
        let (operation, record) = seed_conflict(&store).await;

        let guard = store.lock().await;
        let parked = SqliteOperationRepository::new(guard.connection())
            .get(&operation.id)
            .unwrap()
            .unwrap();
        assert_eq!(parked.status, OperationStatus::Conflict);
        drop(guard);

        let resolver = ConflictResolver::new(Arc::clone(&store));
        let pending = resolver.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, record.id);
        assert_eq!(pending[0].client_version, 3);
        assert_eq!(pending[0].server_version, 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn server_resolution_completes_operation_and_adopts_version() {
        let store = shared_store();
        let (operation, record) = seed_conflict(&store).await;

        let resolver = ConflictResolver::new(Arc::clone(&store));
        let requeued = resolver
            .resolve(&record.id, Resolution::Server, None)
            .await
            .unwrap();
        assert!(!requeued);

        let guard = store.lock().await;
        let resolved_op = SqliteOperationRepository::new(guard.connection())
            .get(&operation.id)
            .unwrap()
            .unwrap();
        assert_eq!(resolved_op.status, OperationStatus::Completed);
        assert_eq!(
            resolved_op.server_snapshot,
            Some(serde_json::json!({"title": "remote"}))
        );
        let version = SqliteVersionRepository::new(guard.connection())
            .current(&EntityKey::new("Note", "42"))
            .unwrap();
        assert_eq!(version, 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn client_resolution_requeues_against_server_version() {
        let store = shared_store();
        let (operation, record) = seed_conflict(&store).await;

        let resolver = ConflictResolver::new(Arc::clone(&store));
        let requeued = resolver
            .resolve(&record.id, Resolution::Client, None)
            .await
            .unwrap();
        assert!(requeued);

        let guard = store.lock().await;
        let requeued_op = SqliteOperationRepository::new(guard.connection())
            .get(&operation.id)
            .unwrap()
            .unwrap();
        assert_eq!(requeued_op.status, OperationStatus::Pending);
        assert_eq!(requeued_op.entity_version_at_creation, Some(5));
        assert_eq!(requeued_op.body, Some(serde_json::json!({"title": "local"})));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn manual_resolution_substitutes_payload() {
        let store = shared_store();
        let (operation, record) = seed_conflict(&store).await;

        let resolver = ConflictResolver::new(Arc::clone(&store));
        let merged = serde_json::json!({"title": "merged"});
        let requeued = resolver
            .resolve(&record.id, Resolution::Manual, Some(merged.clone()))
            .await
            .unwrap();
        assert!(requeued);

        let guard = store.lock().await;
        let requeued_op = SqliteOperationRepository::new(guard.connection())
            .get(&operation.id)
            .unwrap()
            .unwrap();
        assert_eq!(requeued_op.body, Some(merged));
        assert_eq!(requeued_op.entity_version_at_creation, Some(5));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn manual_resolution_without_data_is_rejected() {
        let store = shared_store();
        let (_, record) = seed_conflict(&store).await;

        let resolver = ConflictResolver::new(Arc::clone(&store));
        let err = resolver
            .resolve(&record.id, Resolution::Manual, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        // Rejection left the record untouched
        let fetched = resolver.get(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ConflictStatus::Pending);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolving_twice_is_a_noop() {
        let store = shared_store();
        let (_, record) = seed_conflict(&store).await;

        let resolver = ConflictResolver::new(Arc::clone(&store));
        assert!(resolver
            .resolve(&record.id, Resolution::Client, None)
            .await
            .unwrap());
        assert!(!resolver
            .resolve(&record.id, Resolution::Server, None)
            .await
            .unwrap());

        // The first arbitration sticks
        let fetched = resolver.get(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched.resolution, Some(Resolution::Client));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolving_superseded_source_closes_record_only() {
        let store = shared_store();
        let (operation, record) = seed_conflict(&store).await;

        {
            let guard = store.lock().await;
            SqliteOperationRepository::new(guard.connection())
                .mark_superseded(&operation.id)
                .unwrap();
        }

        let resolver = ConflictResolver::new(Arc::clone(&store));
        let requeued = resolver
            .resolve(&record.id, Resolution::Client, None)
            .await
            .unwrap();
        assert!(!requeued);

        let guard = store.lock().await;
        let untouched = SqliteOperationRepository::new(guard.connection())
            .get(&operation.id)
            .unwrap()
            .unwrap();
        assert_eq!(untouched.status, OperationStatus::Superseded);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolving_missing_conflict_is_not_found() {
        let resolver = ConflictResolver::new(shared_store());
        let err = resolver
            .resolve(&ConflictId::new(), Resolution::Server, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}

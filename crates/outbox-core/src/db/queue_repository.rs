//! Sync operation repository implementation

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::{EntityKey, HttpMethod, OperationId, OperationStatus, SyncOperation};

/// Trait for queued-operation storage
pub trait OperationRepository {
    /// Persist a freshly enqueued operation
    fn insert(&self, operation: &SyncOperation) -> Result<()>;

    /// Get an operation by ID
    fn get(&self, id: &OperationId) -> Result<Option<SyncOperation>>;

    /// List operations, optionally filtered by status, oldest first
    fn list(&self, status: Option<OperationStatus>) -> Result<Vec<SyncOperation>>;

    /// List operations awaiting dispatch, oldest first
    fn list_pending(&self) -> Result<Vec<SyncOperation>>;

    /// Count operations awaiting dispatch
    fn pending_count(&self) -> Result<u64>;

    /// Write back an operation's mutable fields after a status transition
    fn update(&self, operation: &SyncOperation) -> Result<()>;

    /// Mark an operation superseded unless it already reached
    /// completed/superseded; returns whether a row changed
    fn mark_superseded(&self, id: &OperationId) -> Result<bool>;

    /// Force a failed operation back to pending; returns whether a row changed
    fn reset_failed(&self, id: &OperationId) -> Result<bool>;

    /// Return every operation stuck in processing to pending; returns the
    /// number recovered. Processing is only ever transient within a dispatch
    /// pass, so rows found in it belong to a pass that died mid-flight.
    fn recover_processing(&self) -> Result<usize>;

    /// Hard-remove an operation; returns whether a row existed
    fn delete(&self, id: &OperationId) -> Result<bool>;
}

/// `SQLite` implementation of `OperationRepository`
pub struct SqliteOperationRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteOperationRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an operation from a database row
    fn parse_operation(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncOperation> {
        let id: String = row.get(0)?;
        let method: String = row.get(2)?;
        let body: Option<String> = row.get(3)?;
        let headers: String = row.get(4)?;
        let status: String = row.get(6)?;
        let entity_type: Option<String> = row.get(9)?;
        let entity_id: Option<String> = row.get(10)?;
        let server_snapshot: Option<String> = row.get(12)?;

        Ok(SyncOperation {
            id: id
                .parse()
                .map_err(|e: uuid::Error| column_error(0, e.to_string()))?,
            target_url: row.get(1)?,
            method: HttpMethod::parse(&method)
                .ok_or_else(|| column_error(2, format!("unknown method {method}")))?,
            body: body
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e| column_error(3, e.to_string()))?,
            headers: serde_json::from_str(&headers).map_err(|e| column_error(4, e.to_string()))?,
            created_at: row.get(5)?,
            status: OperationStatus::parse(&status)
                .ok_or_else(|| column_error(6, format!("unknown status {status}")))?,
            retry_count: row.get(7)?,
            last_error: row.get(8)?,
            entity: match (entity_type, entity_id) {
                (Some(entity_type), Some(entity_id)) => {
                    Some(EntityKey::new(entity_type, entity_id))
                }
                _ => None,
            },
            entity_version_at_creation: row.get(11)?,
            server_snapshot: server_snapshot
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e| column_error(12, e.to_string()))?,
            completed_at: row.get(13)?,
        })
    }
}

fn column_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, message.into())
}

const SELECT_COLUMNS: &str = "id, target_url, method, body, headers, created_at, status, \
     retry_count, last_error, entity_type, entity_id, entity_version_at_creation, \
     server_snapshot, completed_at";

impl OperationRepository for SqliteOperationRepository<'_> {
    fn insert(&self, operation: &SyncOperation) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_operations (
                id, target_url, method, body, headers, created_at, status,
                retry_count, last_error, entity_type, entity_id,
                entity_version_at_creation, server_snapshot, completed_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                operation.id.as_str(),
                operation.target_url,
                operation.method.as_str(),
                operation.body.as_ref().map(serde_json::Value::to_string),
                serde_json::to_string(&operation.headers)?,
                operation.created_at,
                operation.status.as_str(),
                operation.retry_count,
                operation.last_error,
                operation.entity.as_ref().map(|e| e.entity_type.clone()),
                operation.entity.as_ref().map(|e| e.entity_id.clone()),
                operation.entity_version_at_creation,
                operation
                    .server_snapshot
                    .as_ref()
                    .map(serde_json::Value::to_string),
                operation.completed_at,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &OperationId) -> Result<Option<SyncOperation>> {
        let result = self.conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM sync_operations WHERE id = ?"),
            params![id.as_str()],
            Self::parse_operation,
        );

        match result {
            Ok(operation) => Ok(Some(operation)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, status: Option<OperationStatus>) -> Result<Vec<SyncOperation>> {
        match status {
            Some(status) => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM sync_operations
                     WHERE status = ? ORDER BY created_at ASC, id ASC"
                ))?;
                let operations = stmt
                    .query_map(params![status.as_str()], Self::parse_operation)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(operations)
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM sync_operations ORDER BY created_at ASC, id ASC"
                ))?;
                let operations = stmt
                    .query_map([], Self::parse_operation)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(operations)
            }
        }
    }

    fn list_pending(&self) -> Result<Vec<SyncOperation>> {
        self.list(Some(OperationStatus::Pending))
    }

    fn pending_count(&self) -> Result<u64> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_operations WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn update(&self, operation: &SyncOperation) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE sync_operations SET
                body = ?, status = ?, retry_count = ?, last_error = ?,
                entity_version_at_creation = ?, server_snapshot = ?, completed_at = ?
             WHERE id = ?",
            params![
                operation.body.as_ref().map(serde_json::Value::to_string),
                operation.status.as_str(),
                operation.retry_count,
                operation.last_error,
                operation.entity_version_at_creation,
                operation
                    .server_snapshot
                    .as_ref()
                    .map(serde_json::Value::to_string),
                operation.completed_at,
                operation.id.as_str(),
            ],
        )?;

        if rows == 0 {
            return Err(crate::Error::NotFound(operation.id.to_string()));
        }
        Ok(())
    }

    fn mark_superseded(&self, id: &OperationId) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE sync_operations SET status = 'superseded'
             WHERE id = ? AND status NOT IN ('completed', 'superseded')",
            params![id.as_str()],
        )?;
        Ok(rows > 0)
    }

    fn reset_failed(&self, id: &OperationId) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE sync_operations SET status = 'pending' WHERE id = ? AND status = 'failed'",
            params![id.as_str()],
        )?;
        Ok(rows > 0)
    }

    fn recover_processing(&self) -> Result<usize> {
        let rows = self.conn.execute(
            "UPDATE sync_operations SET status = 'pending' WHERE status = 'processing'",
            [],
        )?;
        Ok(rows)
    }

    fn delete(&self, id: &OperationId) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM sync_operations WHERE id = ?",
            params![id.as_str()],
        )?;
        Ok(rows > 0)
    }
}

//! Conflict record repository implementation

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::{ConflictId, ConflictRecord, ConflictStatus, EntityKey, Resolution};

/// Trait for conflict record storage
pub trait ConflictRepository {
    /// Persist a freshly detected conflict
    fn insert(&self, record: &ConflictRecord) -> Result<()>;

    /// Get a conflict record by ID
    fn get(&self, id: &ConflictId) -> Result<Option<ConflictRecord>>;

    /// List conflicts awaiting arbitration, oldest first
    fn list_pending(&self) -> Result<Vec<ConflictRecord>>;

    /// List recent conflicts including resolved ones, newest first
    fn list_recent(&self, limit: usize) -> Result<Vec<ConflictRecord>>;

    /// Write back a record's arbitration fields
    fn update(&self, record: &ConflictRecord) -> Result<()>;
}

/// `SQLite` implementation of `ConflictRepository`
pub struct SqliteConflictRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteConflictRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a conflict record from a database row
    fn parse_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConflictRecord> {
        let id: String = row.get(0)?;
        let source_operation_id: String = row.get(3)?;
        let server_data: Option<String> = row.get(6)?;
        let client_data: Option<String> = row.get(7)?;
        let status: String = row.get(8)?;
        let resolution: Option<String> = row.get(9)?;
        let resolved_data: Option<String> = row.get(10)?;

        Ok(ConflictRecord {
            id: id
                .parse()
                .map_err(|e: uuid::Error| column_error(0, e.to_string()))?,
            entity: EntityKey::new(row.get::<_, String>(1)?, row.get::<_, String>(2)?),
            source_operation_id: source_operation_id
                .parse()
                .map_err(|e: uuid::Error| column_error(3, e.to_string()))?,
            server_version: row.get(4)?,
            client_version: row.get(5)?,
            server_data: server_data
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e| column_error(6, e.to_string()))?,
            client_data: client_data
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e| column_error(7, e.to_string()))?,
            status: ConflictStatus::parse(&status)
                .ok_or_else(|| column_error(8, format!("unknown status {status}")))?,
            resolution: resolution
                .as_deref()
                .map(|value| {
                    Resolution::parse(value)
                        .ok_or_else(|| column_error(9, format!("unknown resolution {value}")))
                })
                .transpose()?,
            resolved_data: resolved_data
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e| column_error(10, e.to_string()))?,
            created_at: row.get(11)?,
            resolved_at: row.get(12)?,
        })
    }
}

fn column_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, message.into())
}

const SELECT_COLUMNS: &str = "id, entity_type, entity_id, source_operation_id, server_version, \
     client_version, server_data, client_data, status, resolution, resolved_data, \
     created_at, resolved_at";

impl ConflictRepository for SqliteConflictRepository<'_> {
    fn insert(&self, record: &ConflictRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO conflict_records (
                id, entity_type, entity_id, source_operation_id, server_version,
                client_version, server_data, client_data, status, resolution,
                resolved_data, created_at, resolved_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.id.as_str(),
                record.entity.entity_type,
                record.entity.entity_id,
                record.source_operation_id.as_str(),
                record.server_version,
                record.client_version,
                record.server_data.as_ref().map(serde_json::Value::to_string),
                record.client_data.as_ref().map(serde_json::Value::to_string),
                record.status.as_str(),
                record.resolution.map(Resolution::as_str),
                record
                    .resolved_data
                    .as_ref()
                    .map(serde_json::Value::to_string),
                record.created_at,
                record.resolved_at,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &ConflictId) -> Result<Option<ConflictRecord>> {
        let result = self.conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM conflict_records WHERE id = ?"),
            params![id.as_str()],
            Self::parse_record,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_pending(&self) -> Result<Vec<ConflictRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM conflict_records
             WHERE status = 'pending' ORDER BY created_at ASC, id ASC"
        ))?;
        let records = stmt
            .query_map([], Self::parse_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<ConflictRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM conflict_records
             ORDER BY created_at DESC, id DESC LIMIT ?"
        ))?;
        #[allow(clippy::cast_possible_wrap)]
        let records = stmt
            .query_map(params![limit as i64], Self::parse_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn update(&self, record: &ConflictRecord) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE conflict_records SET
                status = ?, resolution = ?, resolved_data = ?, resolved_at = ?
             WHERE id = ?",
            params![
                record.status.as_str(),
                record.resolution.map(Resolution::as_str),
                record
                    .resolved_data
                    .as_ref()
                    .map(serde_json::Value::to_string),
                record.resolved_at,
                record.id.as_str(),
            ],
        )?;

        if rows == 0 {
            return Err(crate::Error::NotFound(record.id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::{OperationRepository, SqliteOperationRepository, Store};
    use crate::models::{HttpMethod, SyncOperation};
    use crate::util::now_ms;

    fn sample(store: &Store) -> ConflictRecord {
        let operation = SyncOperation::new(
            "/api/notes/42",
            HttpMethod::Put,
            Some(serde_json::json!({"title": "local"})),
            HashMap::new(),
        )
        .with_entity(EntityKey::new("Note", "42"), 3);
        SqliteOperationRepository::new(store.connection())
            .insert(&operation)
            .unwrap();

        ConflictRecord::new(
            &operation,
            EntityKey::new("Note", "42"),
            5,
            Some(serde_json::json!({"title": "remote"})),
        )
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let repo = SqliteConflictRepository::new(store.connection());

        let record = sample(&store);
        repo.insert(&record).unwrap();

        let fetched = repo.get(&record.id).unwrap().unwrap();
        assert_eq!(fetched, record);
    }

    #[test]
    fn pending_list_excludes_resolved() {
        let store = Store::open_in_memory().unwrap();
        let repo = SqliteConflictRepository::new(store.connection());

        let mut record = sample(&store);
        repo.insert(&record).unwrap();
        assert_eq!(repo.list_pending().unwrap().len(), 1);

        record.status = ConflictStatus::Resolved;
        record.resolution = Some(Resolution::Server);
        record.resolved_data = record.server_data.clone();
        record.resolved_at = Some(now_ms());
        repo.update(&record).unwrap();

        assert!(repo.list_pending().unwrap().is_empty());
        // ...but the audit listing still has it
        let recent = repo.list_recent(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].resolution, Some(Resolution::Server));
    }

    #[test]
    fn update_missing_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        let repo = SqliteConflictRepository::new(store.connection());
        let record = sample(&store);
        let err = repo.update(&record).unwrap_err();
        assert!(matches!(err, crate::Error::NotFound(_)));
    }
}

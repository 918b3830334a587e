//! Entity version repository implementation
//!
//! Versions are monotonic by construction: every write path goes through an
//! upsert that can only keep or raise the stored counter.

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::{EntityKey, EntityVersion};
use crate::util::now_ms;

/// Trait for per-entity version counters
pub trait VersionRepository {
    /// Get the full version row for an entity
    fn get(&self, key: &EntityKey) -> Result<Option<EntityVersion>>;

    /// Current version for an entity, defaulting to 0 when untracked
    fn current(&self, key: &EntityKey) -> Result<i64>;

    /// Increment the entity's counter by one, creating the row at 1 if
    /// absent; returns the new version
    fn bump(&self, key: &EntityKey) -> Result<i64>;

    /// Raise the entity's counter to `version` if it is not already higher;
    /// returns the stored version. `synced` stamps `last_synced_at`.
    fn advance_to(&self, key: &EntityKey, version: i64, synced: bool) -> Result<i64>;
}

/// `SQLite` implementation of `VersionRepository`
pub struct SqliteVersionRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteVersionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl VersionRepository for SqliteVersionRepository<'_> {
    fn get(&self, key: &EntityKey) -> Result<Option<EntityVersion>> {
        let result = self.conn.query_row(
            "SELECT version, last_modified_at, last_synced_at
             FROM entity_versions WHERE entity_type = ? AND entity_id = ?",
            params![key.entity_type, key.entity_id],
            |row| {
                Ok(EntityVersion {
                    key: key.clone(),
                    version: row.get(0)?,
                    last_modified_at: row.get(1)?,
                    last_synced_at: row.get(2)?,
                })
            },
        );

        match result {
            Ok(version) => Ok(Some(version)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn current(&self, key: &EntityKey) -> Result<i64> {
        Ok(self.get(key)?.map_or(0, |row| row.version))
    }

    fn bump(&self, key: &EntityKey) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO entity_versions (entity_type, entity_id, version, last_modified_at)
             VALUES (?, ?, 1, ?)
             ON CONFLICT(entity_type, entity_id) DO UPDATE SET
                version = version + 1,
                last_modified_at = excluded.last_modified_at",
            params![key.entity_type, key.entity_id, now_ms()],
        )?;
        self.current(key)
    }

    fn advance_to(&self, key: &EntityKey, version: i64, synced: bool) -> Result<i64> {
        let now = now_ms();
        let synced_at = synced.then_some(now);
        self.conn.execute(
            "INSERT INTO entity_versions (entity_type, entity_id, version, last_modified_at, last_synced_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(entity_type, entity_id) DO UPDATE SET
                version = MAX(version, excluded.version),
                last_modified_at = excluded.last_modified_at,
                last_synced_at = COALESCE(excluded.last_synced_at, last_synced_at)",
            params![key.entity_type, key.entity_id, version.max(0), now, synced_at],
        )?;
        self.current(key)
    }
}

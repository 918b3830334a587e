//! Cache entry and offline record repository implementations

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::{CacheEntry, OfflineRecord};
use crate::util::now_ms;

/// Trait for cache entry storage
pub trait CacheRepository {
    /// Insert or replace an entry by key
    fn put(&self, entry: &CacheEntry) -> Result<()>;

    /// Get an entry by key regardless of expiry
    fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Remove every entry whose expiry is at or before `now`;
    /// returns the number of evicted entries
    fn delete_expired(&self, now: i64) -> Result<usize>;
}

/// Trait for offline scratch record storage
pub trait OfflineRepository {
    /// Append a payload to a logical collection; returns the new row id
    fn insert(&self, store_name: &str, payload: &serde_json::Value) -> Result<i64>;

    /// List payloads of a logical collection in insertion order
    fn list(&self, store_name: &str) -> Result<Vec<OfflineRecord>>;
}

/// `SQLite` implementation of `CacheRepository`
pub struct SqliteCacheRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteCacheRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl CacheRepository for SqliteCacheRepository<'_> {
    fn put(&self, entry: &CacheEntry) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO cache_entries (key, payload, stored_at, expires_at)
             VALUES (?, ?, ?, ?)",
            params![
                entry.key,
                entry.payload.to_string(),
                entry.stored_at,
                entry.expires_at
            ],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let result = self.conn.query_row(
            "SELECT key, payload, stored_at, expires_at FROM cache_entries WHERE key = ?",
            params![key],
            |row| {
                let payload: String = row.get(1)?;
                Ok(CacheEntry {
                    key: row.get(0)?,
                    payload: serde_json::from_str(&payload).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            1,
                            rusqlite::types::Type::Text,
                            e.to_string().into(),
                        )
                    })?,
                    stored_at: row.get(2)?,
                    expires_at: row.get(3)?,
                })
            },
        );

        match result {
            Ok(entry) => Ok(Some(entry)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_expired(&self, now: i64) -> Result<usize> {
        let rows = self
            .conn
            .execute("DELETE FROM cache_entries WHERE expires_at <= ?", params![now])?;
        Ok(rows)
    }
}

/// `SQLite` implementation of `OfflineRepository`
pub struct SqliteOfflineRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteOfflineRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl OfflineRepository for SqliteOfflineRepository<'_> {
    fn insert(&self, store_name: &str, payload: &serde_json::Value) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO offline_records (store_name, payload, inserted_at) VALUES (?, ?, ?)",
            params![store_name, payload.to_string(), now_ms()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list(&self, store_name: &str) -> Result<Vec<OfflineRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, store_name, payload, inserted_at
             FROM offline_records WHERE store_name = ? ORDER BY id ASC",
        )?;

        let records = stmt
            .query_map(params![store_name], |row| {
                let payload: String = row.get(2)?;
                Ok(OfflineRecord {
                    id: row.get(0)?,
                    store_name: row.get(1)?,
                    payload: serde_json::from_str(&payload).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            2,
                            rusqlite::types::Type::Text,
                            e.to_string().into(),
                        )
                    })?,
                    inserted_at: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::Store;

    #[test]
    fn cache_put_get_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let repo = SqliteCacheRepository::new(store.connection());

        let entry = CacheEntry::new("patients:list", serde_json::json!([1, 2]), Duration::from_secs(60));
        repo.put(&entry).unwrap();

        let fetched = repo.get("patients:list").unwrap().unwrap();
        assert_eq!(fetched, entry);
        assert!(repo.get("unknown").unwrap().is_none());
    }

    #[test]
    fn cache_put_replaces_existing_key() {
        let store = Store::open_in_memory().unwrap();
        let repo = SqliteCacheRepository::new(store.connection());

        repo.put(&CacheEntry::new("k", serde_json::json!(1), Duration::from_secs(60)))
            .unwrap();
        repo.put(&CacheEntry::new("k", serde_json::json!(2), Duration::from_secs(60)))
            .unwrap();

        let fetched = repo.get("k").unwrap().unwrap();
        assert_eq!(fetched.payload, serde_json::json!(2));
    }

    #[test]
    fn delete_expired_sweeps_only_stale_entries() {
        let store = Store::open_in_memory().unwrap();
        let repo = SqliteCacheRepository::new(store.connection());

        let mut stale = CacheEntry::new("stale", serde_json::json!(1), Duration::from_secs(60));
        stale.expires_at = 10;
        repo.put(&stale).unwrap();
        repo.put(&CacheEntry::new("fresh", serde_json::json!(2), Duration::from_secs(60)))
            .unwrap();

        assert_eq!(repo.delete_expired(100).unwrap(), 1);
        assert!(repo.get("stale").unwrap().is_none());
        assert!(repo.get("fresh").unwrap().is_some());
    }

    #[test]
    fn offline_records_keep_insertion_order_per_store() {
        let store = Store::open_in_memory().unwrap();
        let repo = SqliteOfflineRepository::new(store.connection());

        repo.insert("drafts", &serde_json::json!({"n": 1})).unwrap();
        repo.insert("drafts", &serde_json::json!({"n": 2})).unwrap();
        repo.insert("notes", &serde_json::json!({"n": 3})).unwrap();

        let drafts = repo.list("drafts").unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].payload, serde_json::json!({"n": 1}));
        assert_eq!(drafts[1].payload, serde_json::json!({"n": 2}));
        assert!(repo.list("missing").unwrap().is_empty());
    }
}

//! Database migrations
//!
//! Migrations are version-gated and strictly additive; no migration drops or
//! rewrites existing data.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }
    if version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Migration to version 1: queue and version tracking
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS sync_operations (
            id TEXT PRIMARY KEY,
            target_url TEXT NOT NULL,
            method TEXT NOT NULL,
            body TEXT,
            headers TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            retry_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            entity_type TEXT,
            entity_id TEXT,
            entity_version_at_creation INTEGER,
            server_snapshot TEXT,
            completed_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_sync_operations_status ON sync_operations(status);
        CREATE INDEX IF NOT EXISTS idx_sync_operations_created ON sync_operations(created_at ASC);
        CREATE INDEX IF NOT EXISTS idx_sync_operations_entity ON sync_operations(entity_type, entity_id);
        CREATE TABLE IF NOT EXISTS entity_versions (
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 0,
            last_modified_at INTEGER NOT NULL,
            last_synced_at INTEGER,
            PRIMARY KEY (entity_type, entity_id)
        );
        INSERT INTO schema_version (version) VALUES (1);
        COMMIT;",
    )?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: conflict records
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
        -- source_operation_id intentionally carries no foreign key: conflict
        -- records outlive their operation as an audit trail
        CREATE TABLE IF NOT EXISTS conflict_records (
            id TEXT PRIMARY KEY,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            source_operation_id TEXT NOT NULL,
            server_version INTEGER NOT NULL,
            client_version INTEGER NOT NULL,
            server_data TEXT,
            client_data TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            resolution TEXT,
            resolved_data TEXT,
            created_at INTEGER NOT NULL,
            resolved_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_conflict_records_status ON conflict_records(status);
        CREATE INDEX IF NOT EXISTS idx_conflict_records_source_op ON conflict_records(source_operation_id);
        CREATE INDEX IF NOT EXISTS idx_conflict_records_created ON conflict_records(created_at DESC);
        INSERT INTO schema_version (version) VALUES (2);
        COMMIT;",
    )?;

    tracing::info!("Migrated database to version 2");
    Ok(())
}

/// Migration to version 3: cache entries and offline scratch records
fn migrate_v3(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS cache_entries (
            key TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            stored_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_cache_entries_expires ON cache_entries(expires_at);
        CREATE TABLE IF NOT EXISTS offline_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            store_name TEXT NOT NULL,
            payload TEXT NOT NULL,
            inserted_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_offline_records_store ON offline_records(store_name);
        INSERT INTO schema_version (version) VALUES (3);
        COMMIT;",
    )?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

//! Database connection management

use std::path::Path;

use rusqlite::{Connection, Transaction};

use crate::error::Result;

use super::migrations;

/// Store wrapper owning the `SQLite` connection
///
/// Collections are only ever mutated through [`Store::with_transaction`]; the
/// single-writer discipline above this type (one store handle behind a mutex)
/// preserves the engine's atomicity guarantees on a multi-threaded runtime.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open a store at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically; repeated opens are idempotent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory store (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        let store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    /// Configure `SQLite` for safe concurrent use
    fn configure(&self) -> Result<()> {
        // WAL is unavailable for in-memory databases; ignore failures there
        self.conn
            .pragma_update(None, "journal_mode", "WAL")
            .ok();
        self.conn
            .pragma_update(None, "synchronous", "NORMAL")
            .ok();
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn)
    }

    /// Get a reference to the underlying connection (reads only)
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a transaction with all-or-nothing visibility
    ///
    /// The transaction commits when `f` returns `Ok` and rolls back on `Err`
    /// or panic unwind.
    pub fn with_transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let tx = self.conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

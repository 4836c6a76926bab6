//! Lazily opened shared store handle.
//!
//! # Responsibility
//! - Open the configured database on first use, never before.
//! - Serialize access to the single connection used for reads and writes.
//!
//! # Invariants
//! - The connection is opened at most once per `Store`.
//! - A failed open is not cached; the next call retries it.
//! - Paged reads lock the connection per page, never across pages.

use super::{open_db, open_db_in_memory, DbError, DbResult};
use crate::config::StoreConfig;
use crate::selection::{Page, RowSource, SelectionResult};
use once_cell::sync::OnceCell;
use rusqlite::types::Value;
use rusqlite::Connection;
use std::sync::Mutex;

/// Process-lifetime SQLite handle created on first access.
pub struct Store {
    config: StoreConfig,
    conn: OnceCell<Mutex<Connection>>,
}

impl Store {
    /// Creates a store without touching the database.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            conn: OnceCell::new(),
        }
    }

    /// Wraps an already bootstrapped connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            config: StoreConfig::in_memory(),
            conn: OnceCell::with_value(Mutex::new(conn)),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns whether the connection has been opened yet.
    pub fn is_open(&self) -> bool {
        self.conn.get().is_some()
    }

    /// Runs `f` with exclusive access to the connection, opening it if needed.
    pub fn with_connection<T, E>(&self, f: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E>
    where
        E: From<DbError>,
    {
        let cell = self.conn.get_or_try_init(|| self.open().map(Mutex::new))?;
        let conn = cell.lock().map_err(|_| DbError::Poisoned)?;
        f(&conn)
    }

    fn open(&self) -> DbResult<Connection> {
        match self.config.db_path.as_deref() {
            Some(path) => open_db(path),
            None => open_db_in_memory(),
        }
    }
}

impl RowSource for Store {
    fn fetch_page(&self, sql: &str, binds: &[Value]) -> SelectionResult<Page> {
        self.with_connection(|conn| conn.fetch_page(sql, binds))
    }
}

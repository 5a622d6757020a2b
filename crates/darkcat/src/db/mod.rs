//! Database module for the catalog and the archive job queue.
//!
//! Uses rusqlite (SQLite) with an explicitly owned `Database` handle that is
//! constructed once and passed to each component. All access is serialized
//! through a `Mutex<Connection>`.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Transaction};

pub mod archive_job_repo;
pub mod catalog_repo;
pub mod error;
pub mod inventory_repo;
pub mod migrations;

pub use error::DatabaseError;

/// Thread-safe database handle wrapping a single rusqlite connection.
///
/// Cloning is cheap (inner `Arc`). WAL mode is enabled so browse-layer
/// readers on other connections only ever observe committed manifests.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database at the given path and runs all
    /// pending migrations. `busy_timeout` bounds how long a statement waits
    /// on a lock held by another process.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&conn)?;

        log::info!("Database opened at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database for testing. Runs all migrations.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Provides locked access to the underlying connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }

    /// Runs `f` inside a transaction.
    ///
    /// The outer `Result` reports failures of the transaction itself (lock,
    /// begin, commit). The inner `Result` is whatever `f` returned: `Ok`
    /// values are committed, `Err` values roll the transaction back.
    pub fn transaction<F, T, E>(&self, f: F) -> Result<Result<T, E>, DatabaseError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
    {
        let mut conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        let tx = conn.transaction()?;

        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(Ok(value))
            }
            Err(e) => {
                tx.rollback()?;
                Ok(Err(e))
            }
        }
    }
}

/// Formats a timestamp the way every table stores it: fixed-width RFC 3339
/// in UTC, so lexicographic order matches chronological order.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

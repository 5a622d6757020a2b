//! Inventory repository: one row per indexed manifest.
//!
//! The manifest path, relative to the archive root, is the idempotency key:
//! a manifest with a row here is never opened again.

use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;

/// A raw inventory row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryRow {
    pub id: i64,
    pub path: String,
    pub indexed_at: String,
}

impl InventoryRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            path: row.get("path")?,
            indexed_at: row.get("indexed_at")?,
        })
    }
}

/// Loads every recorded manifest path in one query.
pub fn all_paths(conn: &Connection) -> Result<HashSet<String>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT path FROM inventories")?;
    let paths = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(paths)
}

/// Records a manifest as indexed and returns its row id.
pub fn insert(conn: &Connection, path: &str, indexed_at: &str) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO inventories (path, indexed_at) VALUES (?1, ?2)",
        params![path, indexed_at],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Finds an inventory by its archive-relative path.
pub fn find_by_path(conn: &Connection, path: &str) -> Result<Option<InventoryRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM inventories WHERE path = ?1",
            params![path],
            InventoryRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Counts indexed manifests.
pub fn count(conn: &Connection) -> Result<u64, DatabaseError> {
    let count: u64 = conn.query_row("SELECT COUNT(*) FROM inventories", [], |r| r.get(0))?;
    Ok(count)
}

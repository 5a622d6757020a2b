//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies
//! pending ones in order.

use rusqlite::Connection;

use super::error::DatabaseError;

/// A single migration definition.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_catalog_tables",
        sql: include_str!("sql/001_create_catalog.sql"),
    },
    Migration {
        version: 2,
        description: "create_archive_jobs_table",
        sql: include_str!("sql/002_create_archive_jobs.sql"),
    },
];

/// Runs all pending migrations on the given connection.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        conn.execute_batch(migration.sql)
            .map_err(|source| DatabaseError::Migration {
                version: migration.version,
                name: migration.description,
                source,
            })?;

        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        conn
    }

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = fresh();
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_failed_migration_names_itself() {
        let conn = fresh();
        // A foreign table shape makes the catalog indexes unbuildable
        conn.execute_batch("CREATE TABLE folders (id INTEGER PRIMARY KEY);")
            .unwrap();

        let err = run_all(&conn).unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::Migration {
                version: 1,
                name: "create_catalog_tables",
                ..
            }
        ));
        assert!(err.to_string().contains("create_catalog_tables"));

        let applied: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(applied, 0);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = fresh();
        run_all(&conn).unwrap();
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_file_key_is_unique() {
        let conn = fresh();
        run_all(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO categories (name) VALUES ('alpha');
             INSERT INTO inventories (path, indexed_at) VALUES ('alpha/x.csv', '2026-01-01');
             INSERT INTO files (category_id, inventory_id, archive_date, checksum, filesize,
                                name, full_path, public_path, depth)
             VALUES (1, 1, '2020-01-01', 'aa', 1, 'a', 'alpha/2020-01-01/a', 'a', 0);",
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO files (category_id, inventory_id, archive_date, checksum, filesize,
                                name, full_path, public_path, depth)
             VALUES (1, 1, '2020-01-01', 'bb', 2, 'a', 'alpha/2020-01-01/a', 'a', 0)",
            [],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn test_archive_jobs_defaults() {
        let conn = fresh();
        run_all(&conn).unwrap();
        conn.execute(
            "INSERT INTO archive_jobs (created_at, next_attempt_at, emails, file_ids)
             VALUES ('2026-01-01', '2026-01-01', '[]', '[]')",
            [],
        )
        .unwrap();

        let (status, attempts): (String, u32) = conn
            .query_row("SELECT status, attempts FROM archive_jobs", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(status, "pending");
        assert_eq!(attempts, 0);
    }
}

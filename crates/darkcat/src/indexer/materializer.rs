//! Find-or-create operations for catalog entities.
//!
//! A `CatalogMaterializer` lives for one indexing pass. It memoizes
//! categories and the shallow levels of each category's folder tree so the
//! common prefixes of a large manifest are resolved without a query per
//! record. Entries created inside a manifest transaction are staged and only
//! become visible to later manifests once that transaction commits.

use std::collections::HashMap;

use log::debug;
use rusqlite::Connection;
use thiserror::Error;

use crate::db::catalog_repo::{self, NewFile, NewFolder};
use crate::db::DatabaseError;
use crate::indexer::path_grammar::ParsedPath;
use crate::indexer::record::ManifestRecord;

/// Folder levels (0-based depth) below this are cached; deeper levels are
/// always looked up.
pub const CACHED_FOLDER_LEVELS: usize = 3;

#[derive(Error, Debug)]
pub enum MaterializeError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Folder '{public_path}' already exists under a different parent")]
    FolderConflict { public_path: String },
}

/// Result of storing a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored(i64),
    /// The (category, archive date, public path) key was already taken.
    Duplicate,
}

#[derive(Debug, Default)]
struct Layer {
    categories: HashMap<String, i64>,
    folders: HashMap<(i64, String), i64>,
    real_folders: HashMap<String, i64>,
}

impl Layer {
    fn clear(&mut self) {
        self.categories.clear();
        self.folders.clear();
        self.real_folders.clear();
    }
}

#[derive(Debug, Default)]
pub struct CatalogMaterializer {
    committed: Layer,
    staged: Layer,
}

impl CatalogMaterializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Promotes everything cached since the last commit or rollback.
    pub fn commit(&mut self) {
        let staged = std::mem::take(&mut self.staged);
        self.committed.categories.extend(staged.categories);
        self.committed.folders.extend(staged.folders);
        self.committed.real_folders.extend(staged.real_folders);
    }

    /// Forgets everything cached since the last commit or rollback.
    pub fn rollback(&mut self) {
        self.staged.clear();
    }

    pub fn cached_folder_count(&self) -> usize {
        self.committed.folders.len() + self.staged.folders.len()
    }

    fn cached_category(&self, name: &str) -> Option<i64> {
        self.staged
            .categories
            .get(name)
            .or_else(|| self.committed.categories.get(name))
            .copied()
    }

    fn cached_folder(&self, category_id: i64, public_path: &str) -> Option<i64> {
        let key = (category_id, public_path.to_string());
        self.staged
            .folders
            .get(&key)
            .or_else(|| self.committed.folders.get(&key))
            .copied()
    }

    fn cached_real_folder(&self, real_path: &str) -> Option<i64> {
        self.staged
            .real_folders
            .get(real_path)
            .or_else(|| self.committed.real_folders.get(real_path))
            .copied()
    }

    pub fn find_or_create_category(
        &mut self,
        conn: &Connection,
        name: &str,
    ) -> Result<i64, MaterializeError> {
        if let Some(id) = self.cached_category(name) {
            return Ok(id);
        }

        let id = match catalog_repo::find_category(conn, name)? {
            Some(row) => row.id,
            None => {
                debug!("Creating category '{}'", name);
                catalog_repo::insert_category(conn, name)?
            }
        };

        self.staged.categories.insert(name.to_string(), id);
        Ok(id)
    }

    /// Resolves the collapsed folder for `public_dir`, creating every missing
    /// level from the root down. Each level is also mapped from its real
    /// location, `real_prefix/<level path>`. Returns `None` for the top level.
    pub fn find_or_create_folder(
        &mut self,
        conn: &Connection,
        category_id: i64,
        real_prefix: &str,
        public_dir: &str,
    ) -> Result<Option<i64>, MaterializeError> {
        if public_dir.is_empty() {
            return Ok(None);
        }

        let mut parent_id: Option<i64> = None;
        let mut end = 0;
        for (level, name) in public_dir.split('/').enumerate() {
            end += if level == 0 { name.len() } else { name.len() + 1 };
            let public_path = &public_dir[..end];
            let cacheable = level < CACHED_FOLDER_LEVELS;

            let folder_id = match cacheable
                .then(|| self.cached_folder(category_id, public_path))
                .flatten()
            {
                Some(id) => id,
                None => {
                    let id = self.lookup_or_insert_folder(
                        conn,
                        &NewFolder {
                            category_id,
                            parent_id,
                            name,
                            public_path,
                            depth: level as i64,
                        },
                    )?;
                    if cacheable {
                        self.staged
                            .folders
                            .insert((category_id, public_path.to_string()), id);
                    }
                    id
                }
            };

            let real_path = format!("{}/{}", real_prefix, public_path);
            self.find_or_create_real_folder(conn, folder_id, &real_path, cacheable)?;

            parent_id = Some(folder_id);
        }

        Ok(parent_id)
    }

    fn lookup_or_insert_folder(
        &mut self,
        conn: &Connection,
        folder: &NewFolder<'_>,
    ) -> Result<i64, MaterializeError> {
        match catalog_repo::find_folder(conn, folder.category_id, folder.public_path)? {
            Some(existing) if existing.parent_id == folder.parent_id => Ok(existing.id),
            Some(_) => Err(MaterializeError::FolderConflict {
                public_path: folder.public_path.to_string(),
            }),
            None => Ok(catalog_repo::insert_folder(conn, folder)?),
        }
    }

    /// Maps `real_path` onto `folder_id` unless it is already mapped.
    pub fn find_or_create_real_folder(
        &mut self,
        conn: &Connection,
        folder_id: i64,
        real_path: &str,
        cacheable: bool,
    ) -> Result<i64, MaterializeError> {
        if let Some(id) = self.cached_real_folder(real_path) {
            return Ok(id);
        }

        let id = match catalog_repo::find_real_folder(conn, real_path)? {
            Some(row) => row.id,
            None => catalog_repo::insert_real_folder(conn, folder_id, real_path)?,
        };

        if cacheable {
            self.staged.real_folders.insert(real_path.to_string(), id);
        }
        Ok(id)
    }

    pub fn store_file(
        &mut self,
        conn: &Connection,
        file: &NewFile,
    ) -> Result<StoreOutcome, MaterializeError> {
        match catalog_repo::insert_file(conn, file)? {
            Some(id) => Ok(StoreOutcome::Stored(id)),
            None => Ok(StoreOutcome::Duplicate),
        }
    }

    /// Creates everything one manifest record needs: its category, the
    /// folder chain above it and the file itself.
    pub fn materialize(
        &mut self,
        conn: &Connection,
        inventory_id: i64,
        record: &ManifestRecord,
        parsed: &ParsedPath,
    ) -> Result<StoreOutcome, MaterializeError> {
        let category_id = self.find_or_create_category(conn, &parsed.category)?;

        let (public_dir, name) = match parsed.public_path.rsplit_once('/') {
            Some((dir, name)) => (dir, name),
            None => ("", parsed.public_path.as_str()),
        };
        let folder_id = self.find_or_create_folder(conn, category_id, &parsed.prefix, public_dir)?;

        let file = NewFile {
            category_id,
            inventory_id,
            folder_id,
            archive_date: parsed.archive_date.format("%Y-%m-%d").to_string(),
            checksum: record.checksum.clone(),
            filesize: record.filesize,
            name: name.to_string(),
            full_path: record.full_path.clone(),
            public_path: parsed.public_path.clone(),
            depth: parsed.public_path.matches('/').count() as i64,
        };

        self.store_file(conn, &file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{catalog_repo, inventory_repo, Database};
    use crate::indexer::path_grammar::PathFormat;
    use crate::indexer::record::parse_record;

    const MANIFEST: &str = "Alpha/2020-01-15/INVENTORY/a.csv";

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn inventory(db: &Database) -> i64 {
        db.with_conn(|conn| inventory_repo::insert(conn, MANIFEST, "2026-01-01T00:00:00Z"))
            .unwrap()
    }

    fn materialize_line(
        db: &Database,
        mat: &mut CatalogMaterializer,
        inventory_id: i64,
        line: &str,
    ) -> Result<StoreOutcome, MaterializeError> {
        let record = parse_record(line.as_bytes(), 1, MANIFEST).unwrap().unwrap();
        let format: PathFormat = "category/date".parse().unwrap();
        let parsed = format.parse_path(&record.full_path).unwrap();
        db.with_conn(|conn| Ok(mat.materialize(conn, inventory_id, &record, &parsed)))
            .unwrap()
    }

    #[test]
    fn test_materialize_creates_folder_chain() {
        let db = test_db();
        let inv = inventory(&db);
        let mut mat = CatalogMaterializer::new();

        let outcome = materialize_line(&db, &mut mat, inv, "abc,10,images/raw/a.tif").unwrap();
        assert!(matches!(outcome, StoreOutcome::Stored(_)));

        let category = catalog_repo::find_category_by_name(&db, "Alpha").unwrap().unwrap();
        let top = catalog_repo::child_folders(&db, category.id, None).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].public_path, "images");
        assert_eq!(top[0].depth, 0);

        let nested = catalog_repo::child_folders(&db, category.id, Some(top[0].id)).unwrap();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].name, "raw");
        assert_eq!(nested[0].public_path, "images/raw");
        assert_eq!(nested[0].depth, 1);

        let (files, _) = catalog_repo::folder_files(&db, category.id, Some(nested[0].id), 10).unwrap();
        assert_eq!(files[0].name, "a.tif");
        assert_eq!(files[0].depth, 2);
        assert_eq!(files[0].archive_date, "2020-01-15");
        assert_eq!(files[0].full_path, "Alpha/2020-01-15/images/raw/a.tif");

        db.with_conn(|conn| {
            let real = catalog_repo::find_real_folder(conn, "Alpha/2020-01-15/images/raw")?;
            assert_eq!(real.unwrap().folder_id, nested[0].id);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_top_level_file_has_no_folder() {
        let db = test_db();
        let inv = inventory(&db);
        let mut mat = CatalogMaterializer::new();

        materialize_line(&db, &mut mat, inv, "abc,10,readme.txt").unwrap();
        let category = catalog_repo::find_category_by_name(&db, "Alpha").unwrap().unwrap();
        let (files, total) = catalog_repo::folder_files(&db, category.id, None, 10).unwrap();
        assert_eq!(total, 1);
        assert_eq!(files[0].folder_id, None);
        assert_eq!(catalog_repo::count_folders(&db).unwrap(), 0);
    }

    #[test]
    fn test_duplicate_file_rejected() {
        let db = test_db();
        let inv = inventory(&db);
        let mut mat = CatalogMaterializer::new();

        materialize_line(&db, &mut mat, inv, "abc,10,images/a.tif").unwrap();
        let again = materialize_line(&db, &mut mat, inv, "zzz,99,images/a.tif").unwrap();
        assert_eq!(again, StoreOutcome::Duplicate);
        assert_eq!(catalog_repo::count_files(&db).unwrap(), 1);
    }

    #[test]
    fn test_shared_folders_reused() {
        let db = test_db();
        let inv = inventory(&db);
        let mut mat = CatalogMaterializer::new();

        materialize_line(&db, &mut mat, inv, "a,1,images/raw/a.tif").unwrap();
        materialize_line(&db, &mut mat, inv, "b,1,images/raw/b.tif").unwrap();
        materialize_line(&db, &mut mat, inv, "c,1,images/c.tif").unwrap();
        assert_eq!(catalog_repo::count_folders(&db).unwrap(), 2);
    }

    #[test]
    fn test_deep_levels_not_cached() {
        let db = test_db();
        let inv = inventory(&db);
        let mut mat = CatalogMaterializer::new();

        materialize_line(&db, &mut mat, inv, "a,1,l0/l1/l2/l3/l4/file.bin").unwrap();
        mat.commit();
        assert_eq!(catalog_repo::count_folders(&db).unwrap(), 5);
        assert_eq!(mat.cached_folder_count(), CACHED_FOLDER_LEVELS);

        // Deep levels resolve through the database on the next record
        materialize_line(&db, &mut mat, inv, "b,1,l0/l1/l2/l3/l4/other.bin").unwrap();
        assert_eq!(catalog_repo::count_folders(&db).unwrap(), 5);
    }

    #[test]
    fn test_rollback_discards_staged_cache() {
        let db = test_db();
        let mut mat = CatalogMaterializer::new();

        let result: Result<(), DatabaseError> = db
            .transaction(|tx| {
                mat.find_or_create_category(tx, "Ghost")
                    .map_err(|_| DatabaseError::LockPoisoned)?;
                Err(DatabaseError::LockPoisoned)
            })
            .unwrap();
        assert!(result.is_err());
        mat.rollback();

        // The rolled-back id must not be served from the cache
        let id = db
            .with_conn(|conn| Ok(mat.find_or_create_category(conn, "Ghost")))
            .unwrap()
            .unwrap();
        let row = catalog_repo::find_category_by_name(&db, "Ghost").unwrap().unwrap();
        assert_eq!(row.id, id);
    }

    #[test]
    fn test_folder_conflict_detected() {
        let db = test_db();
        let mut mat = CatalogMaterializer::new();

        db.with_conn(|conn| {
            let category = catalog_repo::insert_category(conn, "Alpha")?;
            // "a/b" recorded as a top-level folder
            catalog_repo::insert_folder(
                conn,
                &NewFolder {
                    category_id: category,
                    parent_id: None,
                    name: "b",
                    public_path: "a/b",
                    depth: 1,
                },
            )?;

            let err = mat
                .find_or_create_folder(conn, category, "Alpha/2020-01-15", "a/b")
                .unwrap_err();
            assert!(matches!(err, MaterializeError::FolderConflict { .. }));
            Ok(())
        })
        .unwrap();
    }
}

//! Catalog repository for categories, collapsed folders, real folders and files.
//!
//! Write operations take a `&Connection` so the indexer can run them inside
//! its per-manifest transaction. Read operations take the `Database` handle
//! and are what the browse layer and the archive processor use.

use std::collections::HashMap;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A category (top-level namespace per depositing unit).
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRow {
    pub id: i64,
    pub name: String,
}

impl CategoryRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
        })
    }
}

/// A node of the collapsed folder hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderRow {
    pub id: i64,
    pub category_id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub public_path: String,
    pub depth: i64,
}

impl FolderRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            category_id: row.get("category_id")?,
            parent_id: row.get("parent_id")?,
            name: row.get("name")?,
            public_path: row.get("public_path")?,
            depth: row.get("depth")?,
        })
    }
}

/// A real filesystem subpath mapped onto a collapsed folder.
#[derive(Debug, Clone, PartialEq)]
pub struct RealFolderRow {
    pub id: i64,
    pub folder_id: i64,
    pub real_path: String,
}

impl RealFolderRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            folder_id: row.get("folder_id")?,
            real_path: row.get("real_path")?,
        })
    }
}

/// One archived asset.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRow {
    pub id: i64,
    pub category_id: i64,
    pub inventory_id: i64,
    pub folder_id: Option<i64>,
    pub archive_date: String,
    pub checksum: String,
    pub filesize: i64,
    pub name: String,
    pub full_path: String,
    pub public_path: String,
    pub depth: i64,
}

impl FileRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            category_id: row.get("category_id")?,
            inventory_id: row.get("inventory_id")?,
            folder_id: row.get("folder_id")?,
            archive_date: row.get("archive_date")?,
            checksum: row.get("checksum")?,
            filesize: row.get("filesize")?,
            name: row.get("name")?,
            full_path: row.get("full_path")?,
            public_path: row.get("public_path")?,
            depth: row.get("depth")?,
        })
    }
}

/// Values for a new folder row.
#[derive(Debug, Clone)]
pub struct NewFolder<'a> {
    pub category_id: i64,
    pub parent_id: Option<i64>,
    pub name: &'a str,
    pub public_path: &'a str,
    pub depth: i64,
}

/// Values for a new file row.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub category_id: i64,
    pub inventory_id: i64,
    pub folder_id: Option<i64>,
    pub archive_date: String,
    pub checksum: String,
    pub filesize: i64,
    pub name: String,
    pub full_path: String,
    pub public_path: String,
    pub depth: i64,
}

// ---------------------------------------------------------------------------
// Write side
// ---------------------------------------------------------------------------

/// Finds a category by its exact name.
pub fn find_category(conn: &Connection, name: &str) -> Result<Option<CategoryRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM categories WHERE name = ?1",
            params![name],
            CategoryRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Inserts a category and returns its id.
pub fn insert_category(conn: &Connection, name: &str) -> Result<i64, DatabaseError> {
    conn.execute("INSERT INTO categories (name) VALUES (?1)", params![name])?;
    Ok(conn.last_insert_rowid())
}

/// Finds a folder by its public path within a category.
pub fn find_folder(
    conn: &Connection,
    category_id: i64,
    public_path: &str,
) -> Result<Option<FolderRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM folders WHERE category_id = ?1 AND public_path = ?2",
            params![category_id, public_path],
            FolderRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Inserts a folder and returns its id.
pub fn insert_folder(conn: &Connection, folder: &NewFolder<'_>) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO folders (category_id, parent_id, name, public_path, depth)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            folder.category_id,
            folder.parent_id,
            folder.name,
            folder.public_path,
            folder.depth,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Finds the real-folder mapping for a filesystem subpath.
pub fn find_real_folder(
    conn: &Connection,
    real_path: &str,
) -> Result<Option<RealFolderRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM real_folders WHERE real_path = ?1",
            params![real_path],
            RealFolderRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Maps a filesystem subpath onto a collapsed folder and returns the row id.
pub fn insert_real_folder(
    conn: &Connection,
    folder_id: i64,
    real_path: &str,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO real_folders (folder_id, real_path) VALUES (?1, ?2)",
        params![folder_id, real_path],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Inserts a file unless its (category, archive date, public path) key is
/// already taken. Returns `None` when the key exists; the existing row is
/// left untouched.
pub fn insert_file(conn: &Connection, file: &NewFile) -> Result<Option<i64>, DatabaseError> {
    let changed = conn.execute(
        "INSERT INTO files (category_id, inventory_id, folder_id, archive_date, checksum,
                            filesize, name, full_path, public_path, depth)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT (category_id, archive_date, public_path) DO NOTHING",
        params![
            file.category_id,
            file.inventory_id,
            file.folder_id,
            file.archive_date,
            file.checksum,
            file.filesize,
            file.name,
            file.full_path,
            file.public_path,
            file.depth,
        ],
    )?;

    if changed == 0 {
        Ok(None)
    } else {
        Ok(Some(conn.last_insert_rowid()))
    }
}

// ---------------------------------------------------------------------------
// Read side
// ---------------------------------------------------------------------------

/// Returns all categories ordered case-insensitively by name.
pub fn all_categories(db: &Database) -> Result<Vec<CategoryRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM categories ORDER BY LOWER(name)")?;
        let rows = stmt
            .query_map([], CategoryRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Finds a category by name through the shared handle.
pub fn find_category_by_name(db: &Database, name: &str) -> Result<Option<CategoryRow>, DatabaseError> {
    db.with_conn(|conn| find_category(conn, name))
}

/// Lists the immediate child folders of `parent` (top level when `None`).
pub fn child_folders(
    db: &Database,
    category_id: i64,
    parent_id: Option<i64>,
) -> Result<Vec<FolderRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM folders WHERE category_id = ?1 AND parent_id IS ?2
             ORDER BY depth, LOWER(public_path)",
        )?;
        let rows = stmt
            .query_map(params![category_id, parent_id], FolderRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Lists files directly inside `folder_id` (top level when `None`), with the
/// total count ignoring `limit`.
pub fn folder_files(
    db: &Database,
    category_id: i64,
    folder_id: Option<i64>,
    limit: u64,
) -> Result<(Vec<FileRow>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let total: u64 = conn.query_row(
            "SELECT COUNT(*) FROM files WHERE category_id = ?1 AND folder_id IS ?2",
            params![category_id, folder_id],
            |r| r.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT * FROM files WHERE category_id = ?1 AND folder_id IS ?2
             ORDER BY depth, LOWER(public_path) LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![category_id, folder_id, limit as i64], FileRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok((rows, total))
    })
}

/// Searches every file below `folder` (or the whole category) whose public
/// path contains `term`. Returns the matches and the total count.
pub fn search_files(
    db: &Database,
    category_id: i64,
    folder: Option<&FolderRow>,
    term: &str,
    limit: u64,
) -> Result<(Vec<FileRow>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = vec![
            "category_id = ?1".to_string(),
            "public_path LIKE ?2 ESCAPE '\\'".to_string(),
        ];
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(category_id), Box::new(format!("%{}%", escape_like(term)))];

        if let Some(folder) = folder {
            conditions.push(format!(
                "public_path LIKE ?{} ESCAPE '\\'",
                param_values.len() + 1
            ));
            param_values.push(Box::new(format!("{}/%", escape_like(&folder.public_path))));
        }

        let where_clause = conditions.join(" AND ");

        let count_sql = format!("SELECT COUNT(*) FROM files WHERE {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        param_values.push(Box::new(limit as i64));
        let query_sql = format!(
            "SELECT * FROM files WHERE {} ORDER BY depth, LOWER(public_path) LIMIT ?{}",
            where_clause,
            param_values.len()
        );
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), FileRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Escapes `LIKE` metacharacters so `value` matches literally under
/// `ESCAPE '\'`.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Finds a file by id.
pub fn find_file_by_id(db: &Database, id: i64) -> Result<Option<FileRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row("SELECT * FROM files WHERE id = ?1", params![id], FileRow::from_row)
            .optional()?;
        Ok(row)
    })
}

/// Loads files by id in the requested order. Unknown ids are omitted.
pub fn files_by_ids(db: &Database, ids: &[i64]) -> Result<Vec<FileRow>, DatabaseError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    db.with_conn(|conn| {
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("SELECT * FROM files WHERE id IN ({})", placeholders);
        let mut stmt = conn.prepare(&sql)?;
        let mut by_id: HashMap<i64, FileRow> = stmt
            .query_map(params_from_iter(ids.iter()), FileRow::from_row)?
            .map(|r| r.map(|f| (f.id, f)))
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    })
}

/// Counts folders across all categories.
pub fn count_folders(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM folders", [], |r| r.get(0))?))
}

/// Counts files across all categories.
pub fn count_files(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM files", [], |r| r.get(0))?))
}

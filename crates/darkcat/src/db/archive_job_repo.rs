//! Archive job queue repository.
//!
//! Jobs move `pending -> processing -> completed`, or back to `pending` with
//! a later `next_attempt_at` when an attempt fails, or to `failed` once the
//! attempt budget is spent. Claiming is a single conditional `UPDATE` so two
//! processors never pick up the same job.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// Lifecycle state of an archive job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// A row from the `archive_jobs` table with its JSON columns decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveJobRow {
    pub id: i64,
    pub created_at: String,
    pub next_attempt_at: String,
    pub emails: Vec<String>,
    pub file_ids: Vec<i64>,
    pub status: JobStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub public_name: Option<String>,
    pub completed_at: Option<String>,
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    idx: &str,
) -> Result<T, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
    })
}

impl ArchiveJobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let status: String = row.get("status")?;
        let status = status.parse::<JobStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;

        Ok(Self {
            id: row.get("id")?,
            created_at: row.get("created_at")?,
            next_attempt_at: row.get("next_attempt_at")?,
            emails: json_column(row, "emails")?,
            file_ids: json_column(row, "file_ids")?,
            status,
            attempts: row.get("attempts")?,
            last_error: row.get("last_error")?,
            public_name: row.get("public_name")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Enqueues a new pending job, eligible immediately. Returns its id.
pub fn insert(
    db: &Database,
    emails: &[String],
    file_ids: &[i64],
    now: &str,
) -> Result<i64, DatabaseError> {
    let emails_json = serde_json::to_string(emails).map_err(|source| DatabaseError::Encode {
        column: "emails",
        source,
    })?;
    let ids_json = serde_json::to_string(file_ids).map_err(|source| DatabaseError::Encode {
        column: "file_ids",
        source,
    })?;

    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO archive_jobs (created_at, next_attempt_at, emails, file_ids, status, attempts)
             VALUES (?1, ?1, ?2, ?3, 'pending', 0)",
            params![now, emails_json, ids_json],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Atomically claims the oldest eligible pending job, marking it
/// `processing` and counting the attempt.
pub fn claim_next(db: &Database, now: &str) -> Result<Option<ArchiveJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let job = conn
            .query_row(
                "UPDATE archive_jobs
                 SET status = 'processing', attempts = attempts + 1
                 WHERE id = (
                     SELECT id FROM archive_jobs
                     WHERE status = 'pending' AND next_attempt_at <= ?1
                     ORDER BY created_at, id
                     LIMIT 1
                 ) AND status = 'pending'
                 RETURNING *",
                params![now],
                ArchiveJobRow::from_row,
            )
            .optional()?;
        Ok(job)
    })
}

/// Records the minted public artifact name before the requester is told.
pub fn record_public_name(db: &Database, id: i64, public_name: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE archive_jobs SET public_name = ?1 WHERE id = ?2",
            params![public_name, id],
        )?;
        Ok(())
    })
}

/// Marks a job completed.
pub fn complete(db: &Database, id: i64, now: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE archive_jobs SET status = 'completed', completed_at = ?1, last_error = NULL
             WHERE id = ?2",
            params![now, id],
        )?;
        Ok(())
    })
}

/// Returns a job to the queue, eligible again at `next_attempt_at`.
pub fn retry_later(
    db: &Database,
    id: i64,
    error: &str,
    next_attempt_at: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE archive_jobs
             SET status = 'pending', last_error = ?1, next_attempt_at = ?2, public_name = NULL
             WHERE id = ?3",
            params![error, next_attempt_at, id],
        )?;
        Ok(())
    })
}

/// Marks a job permanently failed.
pub fn fail(db: &Database, id: i64, error: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE archive_jobs SET status = 'failed', last_error = ?1 WHERE id = ?2",
            params![error, id],
        )?;
        Ok(())
    })
}

/// Finds a job by id.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<ArchiveJobRow>, DatabaseError> {
    db.with_conn(|conn| find_by_id_conn(conn, id))
}

fn find_by_id_conn(conn: &Connection, id: i64) -> Result<Option<ArchiveJobRow>, DatabaseError> {
    let job = conn
        .query_row(
            "SELECT * FROM archive_jobs WHERE id = ?1",
            params![id],
            ArchiveJobRow::from_row,
        )
        .optional()?;
    Ok(job)
}

/// Lists jobs left in `processing`, e.g. by a crash mid-attempt.
pub fn find_processing(db: &Database) -> Result<Vec<ArchiveJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM archive_jobs WHERE status = 'processing' ORDER BY id")?;
        let jobs = stmt
            .query_map([], ArchiveJobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    })
}

/// Puts an interrupted job back in the queue without changing its attempt
/// count or eligibility time.
pub fn reset_to_pending(db: &Database, id: i64) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE archive_jobs SET status = 'pending', public_name = NULL
             WHERE id = ?1 AND status = 'processing'",
            params![id],
        )?;
        Ok(())
    })
}

/// Counts jobs in the given status.
pub fn count_by_status(db: &Database, status: JobStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM archive_jobs WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?)
    })
}

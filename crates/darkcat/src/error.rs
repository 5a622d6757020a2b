use std::path::PathBuf;
use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum DarkcatError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Indexing error: {0}")]
    Index(#[from] IndexError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Logging setup failed: {0}")]
    Logging(#[from] crate::logging::LoggingError),

    #[error("Signal handler error: {0}")]
    Signal(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid path format '{format}': {reason}")]
    InvalidPathFormat { format: String, reason: String },

    #[error("Invalid manifest glob '{pattern}': {reason}")]
    InvalidGlob { pattern: String, reason: String },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// A path that does not fit the configured path grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Path '{path}' has {found} segments, expected {expected}")]
    SegmentCount {
        path: String,
        expected: usize,
        found: usize,
    },

    #[error("Path '{path}' has invalid archive date '{segment}' (expected YYYY-MM-DD)")]
    InvalidDate { path: String, segment: String },

    #[error("Path '{path}' has an empty public path")]
    EmptyPublicPath { path: String },
}

/// A manifest line that cannot become a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Expected 3 comma-separated fields, found {found}")]
    FieldCount { found: usize },

    #[error("Line is not valid UTF-8")]
    InvalidUtf8,

    #[error("Path '{path}' resolves outside the archive root")]
    EscapesRoot { path: String },
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Archive root '{path}' is not a readable directory")]
    ArchiveRoot { path: PathBuf },

    #[error("Invalid manifest pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("Failed to read manifest '{path}': {source}")]
    ReadManifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A statement inside a manifest transaction failed.
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// The storage layer itself failed (lock, begin, commit).
    #[error("Storage unavailable: {0}")]
    Storage(DatabaseError),
}

impl IndexError {
    /// Whether this error aborts the whole indexing pass rather than just
    /// the current manifest.
    pub fn is_infrastructure(&self) -> bool {
        match self {
            IndexError::ArchiveRoot { .. } | IndexError::Pattern { .. } => true,
            IndexError::Storage(_) => true,
            IndexError::Database(DatabaseError::LockPoisoned) => true,
            IndexError::Database(DatabaseError::Io { .. }) => true,
            IndexError::Database(_) | IndexError::ReadManifest { .. } => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to create output directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create temporary bundle in '{path}': {source}")]
    CreateBundle {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read source file '{path}': {source}")]
    ReadSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write bundle entry '{name}': {source}")]
    WriteEntry {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Job {job_id} selects file {file_id}, which is not in the catalog")]
    MissingFile { job_id: i64, file_id: i64 },

    #[error("Failed to publish bundle as '{path}': {source}")]
    Publish {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build download URL for '{name}': {reason}")]
    DownloadUrl { name: String, reason: String },

    #[error("Notification failed: {0}")]
    Notify(#[from] NotifyError),

    #[error("Failed to sweep '{path}': {source}")]
    Sweep {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Invalid address '{address}': {reason}")]
    Address { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Message(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),
}

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("No files selected")]
    EmptySelection,

    #[error("No email addresses given")]
    NoAddresses,

    #[error("Invalid email address list '{list}': {reason}")]
    InvalidAddresses { list: String, reason: String },

    #[error("Unknown file id {0}")]
    UnknownFile(i64),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

pub type Result<T> = std::result::Result<T, DarkcatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_classification() {
        assert!(IndexError::Storage(DatabaseError::LockPoisoned).is_infrastructure());
        assert!(IndexError::Database(DatabaseError::LockPoisoned).is_infrastructure());
        assert!(IndexError::ArchiveRoot {
            path: PathBuf::from("/missing")
        }
        .is_infrastructure());

        let read = IndexError::ReadManifest {
            path: PathBuf::from("a.csv"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(!read.is_infrastructure());

        let constraint = IndexError::Database(DatabaseError::Sqlite(
            rusqlite::Error::QueryReturnedNoRows,
        ));
        assert!(!constraint.is_infrastructure());
    }

    #[test]
    fn test_path_error_names_offending_path() {
        let err = PathError::SegmentCount {
            path: "a/b".to_string(),
            expected: 3,
            found: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("a/b"));
        assert!(msg.contains('3'));
    }
}

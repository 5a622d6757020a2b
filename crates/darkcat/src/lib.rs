pub mod archive;
pub mod config;
pub mod db;
pub mod error;
pub mod indexer;
pub mod logging;
pub mod scheduler;

pub use archive::{submit_job, ArchiveProcessor, ArchiverConfig, JobOutcome, Notifier};
pub use config::{load_config, Config};
pub use db::Database;
pub use error::{
    ArchiveError, ConfigError, DarkcatError, IndexError, NotifyError, PathError, RecordError,
    Result, SubmissionError,
};
pub use indexer::{IndexSummary, Indexer, IndexerConfig, IndexerHandle, IndexerState};
pub use scheduler::Scheduler;

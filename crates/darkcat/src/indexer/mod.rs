//! Incremental manifest indexing.

pub mod config;
pub mod discovery;
pub mod materializer;
pub mod orchestrator;
pub mod path_grammar;
pub mod progress;
pub mod record;

pub use config::IndexerConfig;
pub use orchestrator::{IndexSummary, Indexer, IndexerHandle, IndexerState};
pub use path_grammar::{ParsedPath, PathFormat, PathToken};
pub use progress::{IndexEvent, IndexProgress, NoopProgress};

//! Indexing pass driver and its Stopped/Running/Stopping lifecycle.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use chrono::Utc;
use log::{debug, error, info, warn};
use tracing::info_span;

use crate::db::{self, inventory_repo, Database};
use crate::error::IndexError;
use crate::indexer::config::IndexerConfig;
use crate::indexer::discovery::{discover_manifests, ManifestCandidate};
use crate::indexer::materializer::{CatalogMaterializer, MaterializeError, StoreOutcome};
use crate::indexer::progress::{IndexEvent, IndexProgress, NoopProgress};
use crate::indexer::record::{parse_record, RecordWarning};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IndexerState {
    Stopped = 0,
    Running = 1,
    Stopping = 2,
}

impl IndexerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => IndexerState::Running,
            2 => IndexerState::Stopping,
            _ => IndexerState::Stopped,
        }
    }
}

/// Shared view of an indexer's state for external controllers.
#[derive(Debug, Clone)]
pub struct IndexerHandle {
    state: Arc<AtomicU8>,
}

impl IndexerHandle {
    fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(IndexerState::Stopped as u8)),
        }
    }

    pub fn state(&self) -> IndexerState {
        IndexerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Requests a stop at the next manifest boundary. Does nothing unless
    /// the indexer is running.
    pub fn stop(&self) {
        let _ = self.state.compare_exchange(
            IndexerState::Running as u8,
            IndexerState::Stopping as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Blocks until the indexer is stopped.
    pub fn wait(&self) {
        while self.state() != IndexerState::Stopped {
            std::thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`. Returns
    /// whether the indexer stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.state() != IndexerState::Stopped {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(WAIT_POLL_INTERVAL);
        }
        true
    }

    fn try_start(&self) -> bool {
        self.state
            .compare_exchange(
                IndexerState::Stopped as u8,
                IndexerState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    fn stop_requested(&self) -> bool {
        self.state() == IndexerState::Stopping
    }
}

/// Resets the state to Stopped on every exit path of a pass.
struct RunGuard<'a>(&'a IndexerHandle);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0
            .state
            .store(IndexerState::Stopped as u8, Ordering::SeqCst);
    }
}

/// Counters for one indexing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub manifests_found: u64,
    pub manifests_skipped: u64,
    pub manifests_indexed: u64,
    pub manifests_failed: u64,
    pub files_stored: u64,
    pub duplicates_rejected: u64,
    pub records_rejected: u64,
    pub warnings: u64,
    pub stopped_early: bool,
}

#[derive(Debug, Default)]
struct ManifestStats {
    files_stored: u64,
    duplicates_rejected: u64,
    records_rejected: u64,
    warnings: u64,
}

pub struct Indexer {
    db: Database,
    config: IndexerConfig,
    handle: IndexerHandle,
    progress: Arc<dyn IndexProgress>,
}

impl Indexer {
    pub fn new(db: Database, config: IndexerConfig) -> Self {
        Self::with_progress(db, config, Arc::new(NoopProgress))
    }

    pub fn with_progress(
        db: Database,
        config: IndexerConfig,
        progress: Arc<dyn IndexProgress>,
    ) -> Self {
        Self {
            db,
            config,
            handle: IndexerHandle::new(),
            progress,
        }
    }

    pub fn handle(&self) -> IndexerHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> IndexerState {
        self.handle.state()
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    pub fn wait(&self) {
        self.handle.wait();
    }

    /// Runs one indexing pass over every new manifest.
    ///
    /// Returns immediately with an empty summary if a pass is already
    /// running. A stop request is honoured after the manifest in flight
    /// has been committed or rolled back.
    pub fn run(&self) -> Result<IndexSummary, IndexError> {
        if !self.handle.try_start() {
            debug!("Indexing pass already running, ignoring run request");
            return Ok(IndexSummary::default());
        }
        let _guard = RunGuard(&self.handle);
        let _span = info_span!("index_pass", root = %self.config.archive_root.display()).entered();

        let candidates = discover_manifests(
            &self.config.archive_root,
            &self.config.manifest_glob,
            self.config.min_manifest_age,
            SystemTime::now(),
        )?;

        let seen: HashSet<String> = self
            .db
            .with_conn(inventory_repo::all_paths)
            .map_err(IndexError::Storage)?;

        info!(
            "Starting indexing pass: {} manifest(s) found, {} already indexed",
            candidates.len(),
            seen.len()
        );
        self.progress.report(IndexEvent::PassStarted {
            candidates: candidates.len(),
        });

        let mut summary = IndexSummary::default();
        let mut materializer = CatalogMaterializer::new();

        for candidate in &candidates {
            summary.manifests_found += 1;

            if seen.contains(&candidate.relative_path) {
                summary.manifests_skipped += 1;
                continue;
            }

            self.progress.report(IndexEvent::ManifestStarted {
                path: candidate.relative_path.clone(),
            });

            let result = self.index_manifest(candidate, &mut materializer);
            let files_stored = match result {
                Ok(stats) => {
                    materializer.commit();
                    summary.manifests_indexed += 1;
                    summary.files_stored += stats.files_stored;
                    summary.duplicates_rejected += stats.duplicates_rejected;
                    summary.records_rejected += stats.records_rejected;
                    summary.warnings += stats.warnings;
                    info!(
                        "Indexed {}: {} file(s) stored, {} duplicate(s), {} rejected",
                        candidate.relative_path,
                        stats.files_stored,
                        stats.duplicates_rejected,
                        stats.records_rejected
                    );
                    Some(stats.files_stored)
                }
                Err(e) => {
                    materializer.rollback();
                    summary.manifests_failed += 1;
                    if e.is_infrastructure() {
                        error!("Aborting indexing pass at {}: {}", candidate.relative_path, e);
                        return Err(e);
                    }
                    warn!(
                        "Manifest {} rolled back, will retry next pass: {}",
                        candidate.relative_path, e
                    );
                    None
                }
            };

            self.progress.report(IndexEvent::ManifestFinished {
                path: candidate.relative_path.clone(),
                files_stored: files_stored.unwrap_or(0),
                success: files_stored.is_some(),
            });

            if self.handle.stop_requested() {
                info!("Stop requested, ending indexing pass after {}", candidate.relative_path);
                summary.stopped_early = true;
                break;
            }
        }

        info!(
            "Indexing pass finished: {} indexed, {} skipped, {} failed, {} file(s) stored",
            summary.manifests_indexed,
            summary.manifests_skipped,
            summary.manifests_failed,
            summary.files_stored
        );

        Ok(summary)
    }

    /// Reads one manifest and materializes its records in a single
    /// transaction.
    fn index_manifest(
        &self,
        candidate: &ManifestCandidate,
        materializer: &mut CatalogMaterializer,
    ) -> Result<ManifestStats, IndexError> {
        let _span = info_span!("manifest", path = %candidate.relative_path).entered();

        let data = std::fs::read(&candidate.path).map_err(|e| IndexError::ReadManifest {
            path: candidate.path.clone(),
            source: e,
        })?;

        let manifest = candidate.relative_path.as_str();
        let format = &self.config.path_format;

        self.db
            .transaction(|tx| -> Result<ManifestStats, IndexError> {
                let inventory_id =
                    inventory_repo::insert(tx, manifest, &db::timestamp(Utc::now()))?;
                let mut stats = ManifestStats::default();

                for (index, line) in data.split(|b| *b == b'\n').enumerate() {
                    let record = match parse_record(line, index, manifest) {
                        Ok(Some(record)) => record,
                        Ok(None) => continue,
                        Err(e) => {
                            warn!("Invalid record (manifest {}, record #{}): {}", manifest, index, e);
                            stats.records_rejected += 1;
                            continue;
                        }
                    };

                    if let Some(RecordWarning::InvalidFilesize(raw)) = &record.warning {
                        warn!(
                            "Invalid record (manifest {}, record #{}): invalid filesize value {:?}",
                            manifest, index, raw
                        );
                        stats.warnings += 1;
                    }

                    let parsed = match format.parse_path(&record.full_path) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            warn!("Invalid record (manifest {}, record #{}): {}", manifest, index, e);
                            stats.records_rejected += 1;
                            continue;
                        }
                    };

                    match materializer.materialize(tx, inventory_id, &record, &parsed) {
                        Ok(StoreOutcome::Stored(_)) => stats.files_stored += 1,
                        Ok(StoreOutcome::Duplicate) => {
                            warn!(
                                "Duplicate file (manifest {}, record #{}): {} on {} already cataloged in category '{}'",
                                manifest, index, parsed.public_path, parsed.archive_date, parsed.category
                            );
                            stats.duplicates_rejected += 1;
                        }
                        Err(MaterializeError::FolderConflict { public_path }) => {
                            warn!(
                                "Invalid record (manifest {}, record #{}): folder conflict at '{}'",
                                manifest, index, public_path
                            );
                            stats.records_rejected += 1;
                        }
                        Err(MaterializeError::Database(e)) => return Err(IndexError::Database(e)),
                    }
                }

                Ok(stats)
            })
            .map_err(IndexError::Storage)?
    }
}

//! Isolated dark-archive environment for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use darkcat::archive::{ArchiveProcessor, ArchiverConfig, Notifier, RetryPolicy};
use darkcat::db::Database;
use darkcat::indexer::{IndexProgress, Indexer, IndexerConfig, PathFormat};

pub const DEFAULT_FORMAT: &str = "category/date";
pub const DEFAULT_GLOB: &str = "*/*/INVENTORY/*.csv";

/// Temporary archive root, bundle output directory and on-disk catalog.
pub struct ArchiveFixture {
    temp_dir: TempDir,
    pub root: PathBuf,
    pub output_dir: PathBuf,
    pub db: Database,
}

impl ArchiveFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().join("dark");
        let output_dir = temp_dir.path().join("archives");
        std::fs::create_dir_all(&root).expect("Failed to create archive root");

        let db = Database::open(&temp_dir.path().join("catalog.db"), Duration::from_secs(5))
            .expect("Failed to open catalog");

        Self {
            temp_dir,
            root,
            output_dir,
            db,
        }
    }

    /// Writes a manifest (one line per entry) at `relative` under the root.
    pub fn write_manifest(&self, relative: &str, lines: &[&str]) -> PathBuf {
        let mut body = lines.join("\n");
        body.push('\n');
        self.write_file(relative, body.as_bytes())
    }

    /// Writes an archived asset at `relative` under the root.
    pub fn write_asset(&self, relative: &str, body: &[u8]) -> PathBuf {
        self.write_file(relative, body)
    }

    fn write_file(&self, relative: &str, body: &[u8]) -> PathBuf {
        let path = self.root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
        path
    }

    pub fn indexer_config(&self, format: &str) -> IndexerConfig {
        IndexerConfig {
            archive_root: self.root.clone(),
            path_format: format.parse::<PathFormat>().expect("valid path format"),
            manifest_glob: DEFAULT_GLOB.to_string(),
            min_manifest_age: Duration::ZERO,
        }
    }

    pub fn indexer(&self) -> Indexer {
        Indexer::new(self.db.clone(), self.indexer_config(DEFAULT_FORMAT))
    }

    pub fn indexer_with_progress(&self, progress: Arc<dyn IndexProgress>) -> Indexer {
        Indexer::with_progress(
            self.db.clone(),
            self.indexer_config(DEFAULT_FORMAT),
            progress,
        )
    }

    pub fn archiver_config(&self) -> ArchiverConfig {
        ArchiverConfig {
            archive_root: self.root.clone(),
            output_directory: self.output_dir.clone(),
            web_root: "https://archive.example.org/headlamp/".to_string(),
            lifetime: Duration::from_secs(7 * 86_400),
            orphan_grace: Duration::from_secs(86_400),
            retry: RetryPolicy {
                base: Duration::from_secs(60),
                max: Duration::from_secs(3600),
                max_attempts: 3,
            },
        }
    }

    pub fn processor(&self, notifier: Arc<dyn Notifier>) -> ArchiveProcessor {
        ArchiveProcessor::new(self.db.clone(), self.archiver_config(), notifier)
    }

    pub fn processor_with(
        &self,
        config: ArchiverConfig,
        notifier: Arc<dyn Notifier>,
    ) -> ArchiveProcessor {
        ArchiveProcessor::new(self.db.clone(), config, notifier)
    }

    /// Sorted file names in the bundle output directory.
    pub fn output_files(&self) -> Vec<String> {
        list_dir(&self.output_dir)
    }
}

pub fn list_dir(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

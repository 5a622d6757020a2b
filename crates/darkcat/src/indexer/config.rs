use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::error::ConfigError;
use crate::indexer::path_grammar::PathFormat;

/// Settings for one indexer, resolved from the application config.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub archive_root: PathBuf,
    pub path_format: PathFormat,
    pub manifest_glob: String,
    /// Manifests modified more recently than this are skipped.
    pub min_manifest_age: Duration,
}

impl IndexerConfig {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            archive_root: config.archive_root.clone(),
            path_format: config.path_format.parse()?,
            manifest_glob: config.manifest_glob.clone(),
            min_manifest_age: config.index_interval(),
        })
    }
}

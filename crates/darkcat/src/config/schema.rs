use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub archive_root: PathBuf,
    pub path_format: String,
    #[serde(default = "default_manifest_glob")]
    pub manifest_glob: String,
    pub database_path: PathBuf,
    #[serde(default = "default_index_interval_secs")]
    pub index_interval_secs: u64,
    pub archive_output_directory: PathBuf,
    #[serde(default = "default_archive_lifetime_days")]
    pub archive_lifetime_days: u64,
    #[serde(default = "default_orphan_grace_hours")]
    pub orphan_grace_hours: u64,
    #[serde(default = "default_archive_poll_secs")]
    pub archive_poll_secs: u64,
    pub web_root: String,
    #[serde(default = "default_max_job_attempts")]
    pub max_job_attempts: u32,
    #[serde(default = "default_retry_base_secs")]
    pub retry_base_secs: u64,
    #[serde(default = "default_retry_max_secs")]
    pub retry_max_secs: u64,
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    #[serde(default = "default_storage_timeout_secs")]
    pub storage_timeout_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

fn default_manifest_glob() -> String {
    "*/*/INVENTORY/*.csv".to_string()
}

fn default_index_interval_secs() -> u64 {
    900
}

fn default_archive_lifetime_days() -> u64 {
    7
}

fn default_orphan_grace_hours() -> u64 {
    24
}

fn default_archive_poll_secs() -> u64 {
    60
}

fn default_max_job_attempts() -> u32 {
    10
}

fn default_retry_base_secs() -> u64 {
    60
}

fn default_retry_max_secs() -> u64 {
    3600
}

fn default_storage_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// How often the indexer runs; manifests modified more recently than
    /// this are left for a later pass.
    pub fn index_interval(&self) -> Duration {
        Duration::from_secs(self.index_interval_secs)
    }

    pub fn archive_poll_interval(&self) -> Duration {
        Duration::from_secs(self.archive_poll_secs)
    }

    pub fn archive_lifetime(&self) -> Duration {
        Duration::from_secs(self.archive_lifetime_days * 24 * 60 * 60)
    }

    pub fn orphan_grace(&self) -> Duration {
        Duration::from_secs(self.orphan_grace_hours * 60 * 60)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub from: String,
    #[serde(default = "default_smtp_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_timeout_secs() -> u64 {
    30
}

impl SmtpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

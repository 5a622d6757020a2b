use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;

/// Backoff for failed job attempts: `base * 2^(attempt - 1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Delay before the next attempt, given how many attempts have run.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |d| d.min(self.max))
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(60),
            max: Duration::from_secs(3600),
            max_attempts: 10,
        }
    }
}

/// Settings for the archive job processor.
#[derive(Debug, Clone)]
pub struct ArchiverConfig {
    pub archive_root: PathBuf,
    pub output_directory: PathBuf,
    pub web_root: String,
    pub lifetime: Duration,
    pub orphan_grace: Duration,
    pub retry: RetryPolicy,
}

impl ArchiverConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            archive_root: config.archive_root.clone(),
            output_directory: config.archive_output_directory.clone(),
            web_root: config.web_root.clone(),
            lifetime: config.archive_lifetime(),
            orphan_grace: config.orphan_grace(),
            retry: RetryPolicy {
                base: Duration::from_secs(config.retry_base_secs),
                max: Duration::from_secs(config.retry_max_secs),
                max_attempts: config.max_job_attempts,
            },
        }
    }
}

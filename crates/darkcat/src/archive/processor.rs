//! Archive job processing.
//!
//! One attempt at a job builds the bundle in a temporary file, mints the
//! public name, notifies the requesters and only then publishes the file
//! under that name. Publication is the commit point: until it happens there
//! is nothing downloadable on disk, and once it has happened a restarted
//! processor marks the job completed without notifying again.

use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tracing::info_span;

use crate::archive::bundle::{self, BundleSource};
use crate::archive::cleanup::{self, SweepSummary};
use crate::archive::config::ArchiverConfig;
use crate::archive::notifier::{Notification, Notifier};
use crate::db::archive_job_repo::{self, ArchiveJobRow};
use crate::db::{self, catalog_repo, Database};
use crate::error::ArchiveError;

/// What happened to the job claimed by one call to
/// [`ArchiveProcessor::process_next_job`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    NoneAvailable,
    Completed { job_id: i64, public_name: String },
    Retrying { job_id: i64, next_attempt_at: String },
    Failed { job_id: i64 },
}

pub struct ArchiveProcessor {
    db: Database,
    config: ArchiverConfig,
    notifier: Arc<dyn Notifier>,
}

impl ArchiveProcessor {
    pub fn new(db: Database, config: ArchiverConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            db,
            config,
            notifier,
        }
    }

    /// Resolves jobs left in `processing` by an earlier crash. Jobs whose
    /// bundle was already published are completed; the rest go back to the
    /// queue. Returns how many jobs were touched.
    pub fn recover_interrupted(&self) -> Result<u64, ArchiveError> {
        let stuck = archive_job_repo::find_processing(&self.db)?;
        let now = db::timestamp(Utc::now());

        for job in &stuck {
            let published = job
                .public_name
                .as_deref()
                .is_some_and(|name| self.config.output_directory.join(name).is_file());

            if published {
                info!("Job {} was published before an interruption, marking completed", job.id);
                archive_job_repo::complete(&self.db, job.id, &now)?;
            } else {
                warn!("Job {} was interrupted mid-attempt, returning it to the queue", job.id);
                archive_job_repo::reset_to_pending(&self.db, job.id)?;
            }
        }

        Ok(stuck.len() as u64)
    }

    /// Claims and runs the oldest eligible job, if any.
    ///
    /// A failed attempt is not an error here: the job is rescheduled or, once
    /// its attempts are used up, marked failed. Errors are only returned when
    /// the job queue itself cannot be updated.
    pub fn process_next_job(&self) -> Result<JobOutcome, ArchiveError> {
        let now = Utc::now();
        let Some(job) = archive_job_repo::claim_next(&self.db, &db::timestamp(now))? else {
            debug!("No pending archive jobs");
            return Ok(JobOutcome::NoneAvailable);
        };

        let _span = info_span!("archive_job", job_id = job.id, attempt = job.attempts).entered();
        info!(
            "Processing archive job {} ({} file(s), attempt {})",
            job.id,
            job.file_ids.len(),
            job.attempts
        );

        match self.attempt(&job) {
            Ok(public_name) => {
                archive_job_repo::complete(&self.db, job.id, &db::timestamp(Utc::now()))?;
                info!("Job {} completed as {}", job.id, public_name);
                Ok(JobOutcome::Completed {
                    job_id: job.id,
                    public_name,
                })
            }
            Err(e) if self.config.retry.exhausted(job.attempts) => {
                error!(
                    "Job {} failed permanently after {} attempt(s): {}",
                    job.id, job.attempts, e
                );
                archive_job_repo::fail(&self.db, job.id, &e.to_string())?;
                Ok(JobOutcome::Failed { job_id: job.id })
            }
            Err(e) => {
                let next_attempt_at = db::timestamp(self.next_attempt_at(now, job.attempts));
                warn!(
                    "Job {} attempt {} failed, retrying at {}: {}",
                    job.id, job.attempts, next_attempt_at, e
                );
                archive_job_repo::retry_later(&self.db, job.id, &e.to_string(), &next_attempt_at)?;
                Ok(JobOutcome::Retrying {
                    job_id: job.id,
                    next_attempt_at,
                })
            }
        }
    }

    /// Processes jobs until none is eligible. Returns how many were claimed.
    pub fn run_pending_jobs(&self) -> Result<u64, ArchiveError> {
        let mut processed = 0;
        while self.process_next_job()? != JobOutcome::NoneAvailable {
            processed += 1;
        }
        Ok(processed)
    }

    /// Removes expired bundles and orphaned temporary files.
    pub fn sweep(&self) -> Result<SweepSummary, ArchiveError> {
        cleanup::sweep(
            &self.config.output_directory,
            self.config.lifetime,
            self.config.orphan_grace,
            SystemTime::now(),
        )
    }

    fn next_attempt_at(&self, now: DateTime<Utc>, attempts: u32) -> DateTime<Utc> {
        let delay = self.config.retry.delay_for(attempts);
        chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(now)
    }

    /// One attempt at a job. The temporary bundle is dropped, and so
    /// deleted, on every path that returns an error.
    fn attempt(&self, job: &ArchiveJobRow) -> Result<String, ArchiveError> {
        let files = catalog_repo::files_by_ids(&self.db, &job.file_ids)?;
        if let Some(missing) = job
            .file_ids
            .iter()
            .find(|id| !files.iter().any(|f| f.id == **id))
        {
            return Err(ArchiveError::MissingFile {
                job_id: job.id,
                file_id: *missing,
            });
        }

        let sources: Vec<BundleSource> = files
            .iter()
            .map(|f| BundleSource::from_catalog_path(&self.config.archive_root, &f.full_path))
            .collect();

        let temp = bundle::write_bundle(&self.config.output_directory, &sources)?;

        let public_name = bundle::mint_public_name();
        let download_url = download_url(&self.config.web_root, &public_name)?;
        archive_job_repo::record_public_name(&self.db, job.id, &public_name)?;

        self.notifier.notify(&Notification {
            recipients: job.emails.clone(),
            download_url,
        })?;

        bundle::publish(temp, &self.config.output_directory, &public_name)?;
        Ok(public_name)
    }
}

/// Builds the absolute download link `web_root/archives/<name>`.
pub fn download_url(web_root: &str, name: &str) -> Result<String, ArchiveError> {
    let bad = |reason: &str| ArchiveError::DownloadUrl {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let mut url = url::Url::parse(web_root).map_err(|e| bad(&e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| bad("web root cannot be a base URL"))?
        .pop_if_empty()
        .push("archives")
        .push(name);

    Ok(url.to_string())
}

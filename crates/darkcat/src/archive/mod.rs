//! Archive bundling jobs: submission, processing and cleanup.

pub mod bundle;
pub mod cleanup;
pub mod config;
pub mod notifier;
pub mod processor;
pub mod submission;

pub use cleanup::{sweep, SweepSummary};
pub use config::{ArchiverConfig, RetryPolicy};
pub use notifier::{Notification, Notifier, SmtpNotifier};
pub use processor::{download_url, ArchiveProcessor, JobOutcome};
pub use submission::{parse_address_list, submit_job};

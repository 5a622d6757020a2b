//! Archive job processing against a temporary dark archive.

mod common;

use std::fs::File;
use std::sync::Arc;
use std::time::Duration;

use common::{ArchiveFixture, FailingNotifier, RecordingNotifier};
use darkcat::archive::bundle::{PUBLIC_PREFIX, WIP_PREFIX};
use darkcat::archive::{submit_job, JobOutcome};
use darkcat::db::archive_job_repo::{self, JobStatus};
use darkcat::db::catalog_repo;
use darkcat::db::{self, Database};

/// Indexes three assets (two sharing a file name) and returns their ids.
fn indexed_fixture() -> (ArchiveFixture, Vec<i64>) {
    let fixture = ArchiveFixture::new();
    fixture.write_asset("Alpha/2020-01-15/images/a.tif", &[1u8; 100]);
    fixture.write_asset("Alpha/2020-01-15/images/raw/a.tif", &[2u8; 2048]);
    fixture.write_asset("Alpha/2020-01-15/notes.txt", b"field notes");
    fixture.write_manifest(
        "Alpha/2020-01-15/INVENTORY/batch1.csv",
        &[
            "sha256sum,size,name",
            "aaa,100,images/a.tif",
            "bbb,2048,images/raw/a.tif",
            "ccc,11,notes.txt",
        ],
    );
    fixture.indexer().run().unwrap();

    let alpha = catalog_repo::find_category_by_name(&fixture.db, "Alpha")
        .unwrap()
        .unwrap();
    let (files, _) = catalog_repo::search_files(&fixture.db, alpha.id, None, "", 10).unwrap();
    assert_eq!(files.len(), 3);
    let ids = files.iter().map(|f| f.id).collect();
    (fixture, ids)
}

fn tar_entries(path: &std::path::Path) -> Vec<(String, u64, u32)> {
    let mut archive = tar::Archive::new(File::open(path).unwrap());
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let header = entry.header();
            (name, header.size().unwrap(), header.mode().unwrap())
        })
        .collect()
}

fn job(db: &Database, id: i64) -> archive_job_repo::ArchiveJobRow {
    archive_job_repo::find_by_id(db, id).unwrap().unwrap()
}

#[test]
fn test_bundle_three_files_and_publish_after_notify() {
    let (fixture, ids) = indexed_fixture();
    let job_id = submit_job(&fixture.db, "Reader <reader@example.org>", &ids).unwrap();

    let notifier = Arc::new(RecordingNotifier::new(fixture.output_dir.clone()));
    let processor = fixture.processor(notifier.clone());

    let outcome = processor.process_next_job().unwrap();
    let JobOutcome::Completed { public_name, .. } = outcome else {
        panic!("expected completed job, got {:?}", outcome);
    };
    assert!(public_name.starts_with(PUBLIC_PREFIX));

    // Nothing downloadable existed while the notification went out
    assert_eq!(notifier.public_files_at_send(), vec![Vec::<String>::new()]);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipients, vec!["reader@example.org"]);
    assert_eq!(
        sent[0].download_url,
        format!("https://archive.example.org/headlamp/archives/{}", public_name)
    );

    // Only the published bundle is left behind
    assert_eq!(fixture.output_files(), vec![public_name.clone()]);

    let mut entries = tar_entries(&fixture.output_dir.join(&public_name));
    entries.sort();
    assert_eq!(
        entries,
        vec![
            ("Alpha__2020-01-15__images__a.tif".to_string(), 100, 0o600),
            ("Alpha__2020-01-15__images__raw__a.tif".to_string(), 2048, 0o600),
            ("Alpha__2020-01-15__notes.txt".to_string(), 11, 0o600),
        ]
    );
    assert!(entries.iter().all(|(name, _, _)| !name.contains('/')));

    let row = job(&fixture.db, job_id);
    assert_eq!(row.status, JobStatus::Completed);
    assert_eq!(row.public_name.as_deref(), Some(public_name.as_str()));
    assert!(row.completed_at.is_some());
}

#[test]
fn test_notification_failure_leaves_nothing_public() {
    let (fixture, ids) = indexed_fixture();
    let job_id = submit_job(&fixture.db, "reader@example.org", &ids).unwrap();

    let processor = fixture.processor(Arc::new(FailingNotifier));
    let outcome = processor.process_next_job().unwrap();
    assert!(matches!(outcome, JobOutcome::Retrying { .. }));

    assert!(fixture
        .output_files()
        .iter()
        .all(|n| !n.starts_with(PUBLIC_PREFIX) && !n.starts_with(WIP_PREFIX)));

    let row = job(&fixture.db, job_id);
    assert_eq!(row.status, JobStatus::Pending);
    assert_eq!(row.attempts, 1);
    assert!(row.public_name.is_none());
    assert!(row.last_error.unwrap().contains("connection refused"));
    assert!(row.next_attempt_at > row.created_at);

    // Backed off: not eligible again straight away
    assert_eq!(processor.process_next_job().unwrap(), JobOutcome::NoneAvailable);
}

#[test]
fn test_missing_source_file_retried_then_failed() {
    let (fixture, ids) = indexed_fixture();
    let job_id = submit_job(&fixture.db, "reader@example.org", &ids).unwrap();
    std::fs::remove_file(fixture.root.join("Alpha/2020-01-15/notes.txt")).unwrap();

    let notifier = Arc::new(RecordingNotifier::new(fixture.output_dir.clone()));
    let mut config = fixture.archiver_config();
    config.retry.base = Duration::ZERO;
    config.retry.max = Duration::ZERO;
    config.retry.max_attempts = 2;
    let processor = fixture.processor_with(config, notifier.clone());

    assert!(matches!(
        processor.process_next_job().unwrap(),
        JobOutcome::Retrying { .. }
    ));
    assert!(fixture.output_files().is_empty());

    assert_eq!(
        processor.process_next_job().unwrap(),
        JobOutcome::Failed { job_id }
    );
    assert!(fixture.output_files().is_empty());
    assert!(notifier.sent().is_empty());

    let row = job(&fixture.db, job_id);
    assert_eq!(row.status, JobStatus::Failed);
    assert_eq!(row.attempts, 2);
    assert!(row.last_error.unwrap().contains("notes.txt"));
}

#[test]
fn test_run_pending_jobs_drains_queue_in_order() {
    let (fixture, ids) = indexed_fixture();
    let first = submit_job(&fixture.db, "one@example.org", &ids[..1]).unwrap();
    let second = submit_job(&fixture.db, "two@example.org", &ids[1..]).unwrap();

    let notifier = Arc::new(RecordingNotifier::new(fixture.output_dir.clone()));
    let processor = fixture.processor(notifier.clone());

    assert_eq!(processor.run_pending_jobs().unwrap(), 2);

    let recipients: Vec<String> = notifier
        .sent()
        .into_iter()
        .flat_map(|n| n.recipients)
        .collect();
    assert_eq!(recipients, vec!["one@example.org", "two@example.org"]);
    assert_eq!(job(&fixture.db, first).status, JobStatus::Completed);
    assert_eq!(job(&fixture.db, second).status, JobStatus::Completed);
    assert_eq!(fixture.output_files().len(), 2);
}

#[test]
fn test_recover_interrupted_jobs() {
    let (fixture, ids) = indexed_fixture();
    let published = submit_job(&fixture.db, "a@example.org", &ids).unwrap();
    let unpublished = submit_job(&fixture.db, "b@example.org", &ids).unwrap();

    // Simulate a crash: both claimed, only the first got as far as publishing
    let now = db::timestamp(chrono::Utc::now());
    archive_job_repo::claim_next(&fixture.db, &now).unwrap().unwrap();
    archive_job_repo::claim_next(&fixture.db, &now).unwrap().unwrap();
    archive_job_repo::record_public_name(&fixture.db, published, "archive-done.tar").unwrap();
    archive_job_repo::record_public_name(&fixture.db, unpublished, "archive-lost.tar").unwrap();
    std::fs::create_dir_all(&fixture.output_dir).unwrap();
    std::fs::write(fixture.output_dir.join("archive-done.tar"), b"bundle").unwrap();

    let notifier = Arc::new(RecordingNotifier::new(fixture.output_dir.clone()));
    let processor = fixture.processor(notifier.clone());
    assert_eq!(processor.recover_interrupted().unwrap(), 2);

    assert_eq!(job(&fixture.db, published).status, JobStatus::Completed);
    let requeued = job(&fixture.db, unpublished);
    assert_eq!(requeued.status, JobStatus::Pending);
    assert!(requeued.public_name.is_none());

    // Only the unpublished job is notified on the next run
    assert_eq!(processor.run_pending_jobs().unwrap(), 1);
    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipients, vec!["b@example.org"]);
}

#[test]
fn test_sweep_removes_expired_bundles() {
    let (fixture, ids) = indexed_fixture();
    submit_job(&fixture.db, "reader@example.org", &ids).unwrap();

    let notifier = Arc::new(RecordingNotifier::new(fixture.output_dir.clone()));
    fixture
        .processor(notifier.clone())
        .run_pending_jobs()
        .unwrap();
    std::fs::write(fixture.output_dir.join("README"), b"keep me").unwrap();

    // Fresh bundles survive the configured lifetime
    let summary = fixture.processor(notifier.clone()).sweep().unwrap();
    assert_eq!(summary.bundles_removed, 0);
    assert_eq!(fixture.output_files().len(), 2);

    let mut config = fixture.archiver_config();
    config.lifetime = Duration::ZERO;
    let summary = fixture.processor_with(config, notifier).sweep().unwrap();
    assert_eq!(summary.bundles_removed, 1);
    assert_eq!(fixture.output_files(), vec!["README"]);
}

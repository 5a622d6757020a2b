use std::path::Path;
use std::time::{Duration, SystemTime};

use log::{debug, error, info};
use walkdir::WalkDir;

use crate::archive::bundle::{BUNDLE_SUFFIX, PUBLIC_PREFIX, WIP_PREFIX};
use crate::error::ArchiveError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub bundles_removed: u64,
    pub orphans_removed: u64,
    pub failures: u64,
}

/// Deletes published bundles older than `lifetime` and temporary bundles
/// older than `orphan_grace` from `output_dir`. Other files are never
/// touched. A missing directory is treated as empty.
pub fn sweep(
    output_dir: &Path,
    lifetime: Duration,
    orphan_grace: Duration,
    now: SystemTime,
) -> Result<SweepSummary, ArchiveError> {
    let mut summary = SweepSummary::default();
    if !output_dir.exists() {
        return Ok(summary);
    }

    for entry in WalkDir::new(output_dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| ArchiveError::Sweep {
            path: output_dir.to_path_buf(),
            source: e.into(),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !name.ends_with(BUNDLE_SUFFIX) {
            continue;
        }

        let (max_age, orphan) = if name.starts_with(PUBLIC_PREFIX) {
            (lifetime, false)
        } else if name.starts_with(WIP_PREFIX) {
            (orphan_grace, true)
        } else {
            continue;
        };

        let age = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|mtime| now.duration_since(mtime).ok())
            .unwrap_or(Duration::ZERO);
        if age < max_age {
            debug!("Skipping {}: too recently modified", name);
            continue;
        }

        match std::fs::remove_file(entry.path()) {
            Ok(()) => {
                info!("Removed {}", entry.path().display());
                if orphan {
                    summary.orphans_removed += 1;
                } else {
                    summary.bundles_removed += 1;
                }
            }
            Err(e) => {
                error!("Unable to delete {}: {}", entry.path().display(), e);
                summary.failures += 1;
            }
        }
    }

    Ok(summary)
}

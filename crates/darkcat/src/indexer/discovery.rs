use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use log::{debug, warn};

use crate::error::IndexError;

/// Aggregate manifests are never indexed.
pub const AGGREGATE_MANIFEST: &str = "manifest.csv";

/// A manifest eligible for indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestCandidate {
    pub path: PathBuf,
    /// Path relative to the archive root, `/`-separated; the idempotency key.
    pub relative_path: String,
}

/// Finds manifests matching `pattern` under `root`, in glob order.
///
/// Skips aggregate manifests and anything modified less than `min_age`
/// before `now`, since it may still be being written.
pub fn discover_manifests(
    root: &Path,
    pattern: &str,
    min_age: Duration,
    now: SystemTime,
) -> Result<Vec<ManifestCandidate>, IndexError> {
    if !root.is_dir() {
        return Err(IndexError::ArchiveRoot {
            path: root.to_path_buf(),
        });
    }
    let root_str = root.to_str().ok_or_else(|| IndexError::ArchiveRoot {
        path: root.to_path_buf(),
    })?;

    let full_pattern = format!(
        "{}/{}",
        glob::Pattern::escape(root_str.trim_end_matches('/')),
        pattern
    );
    let entries = glob::glob(&full_pattern).map_err(|e| IndexError::Pattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;

    let mut candidates = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!("Skipping unreadable path during manifest discovery: {}", e);
                continue;
            }
        };

        if path.file_name().and_then(|n| n.to_str()) == Some(AGGREGATE_MANIFEST) {
            continue;
        }

        let metadata = match std::fs::metadata(&path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                warn!("Cannot stat manifest {}: {}", path.display(), e);
                continue;
            }
        };

        // A modification time in the future counts as brand new
        let old_enough = metadata
            .modified()
            .map(|mtime| now.duration_since(mtime).unwrap_or(Duration::ZERO) >= min_age)
            .unwrap_or(false);
        if !old_enough {
            debug!("Manifest {} is too recent, leaving it for a later pass", path.display());
            continue;
        }

        let Some(relative_path) = relative_key(root, &path) else {
            warn!("Skipping manifest with non-UTF-8 path: {}", path.display());
            continue;
        };

        candidates.push(ManifestCandidate {
            path,
            relative_path,
        });
    }

    Ok(candidates)
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

//! Bundle containers: uncompressed tar files built in a temporary file and
//! published under a public name.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use log::debug;
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::error::ArchiveError;

/// Prefix of bundles still being written.
pub const WIP_PREFIX: &str = ".wip-";
/// Prefix of published, downloadable bundles.
pub const PUBLIC_PREFIX: &str = "archive-";
pub const BUNDLE_SUFFIX: &str = ".tar";

/// Mode stored for every entry: owner read/write only.
pub const ENTRY_MODE: u32 = 0o600;

/// One file to place in a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSource {
    pub path: PathBuf,
    pub entry_name: String,
}

impl BundleSource {
    /// Source for a catalog path relative to the archive root.
    pub fn from_catalog_path(archive_root: &Path, full_path: &str) -> Self {
        Self {
            path: archive_root.join(full_path),
            entry_name: flatten_entry_name(full_path),
        }
    }
}

/// Replaces path separators so files from different directories cannot
/// collide inside the flat container.
pub fn flatten_entry_name(path: &str) -> String {
    path.replace('/', "__")
}

/// Writes `sources` into a new `.wip-*.tar` file in `output_dir`.
///
/// The returned file is deleted when dropped, so any caller that does not
/// publish it leaves nothing behind.
pub fn write_bundle(
    output_dir: &Path,
    sources: &[BundleSource],
) -> Result<NamedTempFile, ArchiveError> {
    std::fs::create_dir_all(output_dir).map_err(|e| ArchiveError::CreateDirectory {
        path: output_dir.to_path_buf(),
        source: e,
    })?;

    let mut temp = tempfile::Builder::new()
        .prefix(WIP_PREFIX)
        .suffix(BUNDLE_SUFFIX)
        .tempfile_in(output_dir)
        .map_err(|e| ArchiveError::CreateBundle {
            path: output_dir.to_path_buf(),
            source: e,
        })?;

    {
        let mut builder = tar::Builder::new(temp.as_file_mut());
        for source in sources {
            append_source(&mut builder, source)?;
        }
        builder.finish().map_err(|e| ArchiveError::CreateBundle {
            path: temp_path(output_dir),
            source: e,
        })?;
    }

    temp.as_file().sync_all().map_err(|e| ArchiveError::CreateBundle {
        path: temp.path().to_path_buf(),
        source: e,
    })?;

    debug!("Wrote {} entries to {}", sources.len(), temp.path().display());
    Ok(temp)
}

fn temp_path(output_dir: &Path) -> PathBuf {
    output_dir.join(format!("{}*{}", WIP_PREFIX, BUNDLE_SUFFIX))
}

fn append_source<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    source: &BundleSource,
) -> Result<(), ArchiveError> {
    let read_err = |e: std::io::Error| ArchiveError::ReadSource {
        path: source.path.clone(),
        source: e,
    };

    let file = File::open(&source.path).map_err(read_err)?;
    let metadata = file.metadata().map_err(read_err)?;
    if !metadata.is_file() {
        return Err(read_err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }

    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(metadata.len());
    header.set_mode(ENTRY_MODE);
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs());
    header.set_mtime(mtime);

    builder
        .append_data(&mut header, &source.entry_name, file)
        .map_err(|e| ArchiveError::WriteEntry {
            name: source.entry_name.clone(),
            source: e,
        })
}

/// Mints a fresh public bundle name, `archive-<uuid>.tar`.
pub fn mint_public_name() -> String {
    format!("{}{}{}", PUBLIC_PREFIX, Uuid::new_v4().simple(), BUNDLE_SUFFIX)
}

/// Publishes a finished bundle as `output_dir/name` without overwriting
/// anything already there. On failure the temporary file is removed.
pub fn publish(temp: NamedTempFile, output_dir: &Path, name: &str) -> Result<PathBuf, ArchiveError> {
    let destination = output_dir.join(name);
    temp.persist_noclobber(&destination)
        .map_err(|e| ArchiveError::Publish {
            path: destination.clone(),
            source: e.error,
        })?;
    Ok(destination)
}

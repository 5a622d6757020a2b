//! Manifest line parsing.

use crate::error::RecordError;

/// First field of the optional header line.
pub const HEADER_FIELD: &str = "sha256sum";

/// One asset line from a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRecord {
    pub checksum: String,
    /// Size in bytes; 0 when the manifest value was unreadable.
    pub filesize: i64,
    /// Normalized path relative to the archive root.
    pub full_path: String,
    pub warning: Option<RecordWarning>,
}

/// A problem that does not stop the record from being stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordWarning {
    InvalidFilesize(String),
}

/// Parses line `index` (0-based) of the manifest at `manifest_path`, a path
/// relative to the archive root.
///
/// Returns `Ok(None)` for lines that carry no record: blank lines and the
/// header on line 0. Relative paths in a manifest are resolved against the
/// manifest's grandparent directory.
pub fn parse_record(
    line: &[u8],
    index: usize,
    manifest_path: &str,
) -> Result<Option<ManifestRecord>, RecordError> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.is_empty() {
        return Ok(None);
    }

    let line = std::str::from_utf8(line).map_err(|_| RecordError::InvalidUtf8)?;

    // Paths may contain commas; checksum and size never do
    let fields: Vec<&str> = line.splitn(3, ',').collect();

    if index == 0 && fields[0] == HEADER_FIELD {
        return Ok(None);
    }

    let [checksum, size, relative] = fields[..] else {
        return Err(RecordError::FieldCount {
            found: fields.len(),
        });
    };

    let (filesize, warning) = match size.parse::<i64>() {
        Ok(n) => (n, None),
        Err(_) => (0, Some(RecordWarning::InvalidFilesize(size.to_string()))),
    };

    let manifest_dir = match manifest_path.rfind('/') {
        Some(pos) => &manifest_path[..pos],
        None => "",
    };
    let joined = format!("{}/../{}", manifest_dir, relative);
    let full_path = normalize_path(&joined).ok_or_else(|| RecordError::EscapesRoot {
        path: joined.clone(),
    })?;

    Ok(Some(ManifestRecord {
        checksum: checksum.to_string(),
        filesize,
        full_path,
        warning,
    }))
}

/// Lexically cleans a `/`-separated relative path. Returns `None` if the
/// path climbs above its starting point.
pub fn normalize_path(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

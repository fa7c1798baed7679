//! Content addressing: deterministic local paths for source addresses.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::types::WorkingSet;

/// Characters that end the last path segment of an address.
const SEGMENT_BREAKS: &[char] = &['/', '\\', '?', '#'];

/// Subdirectory of the temp root holding per-run work directories.
pub const WORK_ROOT: &str = "work";

/// Hex SHA-256 of an address.
pub fn address_hash(address: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(address.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Extension of an address including its leading dot (`.ttl`), or `""` when
/// the text after the last dot is not a plain suffix.
pub fn address_extension(address: &str) -> &str {
    match address.rfind('.') {
        Some(idx) if !address[idx..].contains(SEGMENT_BREAKS) => &address[idx..],
        _ => "",
    }
}

/// `<tmp_dir>/<sha256(address)><extension>`.
pub fn source_path(tmp_dir: &Path, address: &str) -> PathBuf {
    tmp_dir.join(format!(
        "{}{}",
        address_hash(address),
        address_extension(address)
    ))
}

/// Work directory for a source path: its file name with punctuation removed,
/// under the `work/` subdirectory of the source's directory. Source files sit
/// directly in the temp root, so the two never coincide even when the
/// address has no extension.
pub fn work_dir(source_path: &Path) -> PathBuf {
    let stem: String = source_path
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect();

    match source_path.parent() {
        Some(parent) => parent.join(WORK_ROOT).join(stem),
        None => Path::new(WORK_ROOT).join(stem),
    }
}

impl WorkingSet {
    /// Derive the run's paths from a source address.
    pub fn for_address(tmp_dir: &Path, address: &str) -> Self {
        let local_source_path = source_path(tmp_dir, address);
        let work_dir = work_dir(&local_source_path);
        Self {
            local_source_path,
            work_dir,
        }
    }
}

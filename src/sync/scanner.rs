//! Flat directory scan.
//!
//! Only regular files directly under the root take part in sync. The index
//! file and our own in-flight download temp files are excluded, as are names
//! the index format cannot represent.

use crate::error::{Result, SyncError};
use crate::index::{is_indexable_name, INDEX_FILENAME, INDEX_TEMP_FILENAME};
use std::fs;
use std::path::{Component, Path};

/// Suffix of temp files written while materializing a download
pub const TEMP_SUFFIX: &str = ".surfsync.tmp";

/// Outcome of scanning the sync root
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanResult {
    /// Synchronizable filenames, sorted
    pub files: Vec<String>,
    /// Regular files that were left out because of their name
    pub skipped: Vec<String>,
}

/// Names the engine keeps for itself inside the sync root.
pub fn is_reserved_name(name: &str) -> bool {
    name == INDEX_FILENAME || name == INDEX_TEMP_FILENAME || name.ends_with(TEMP_SUFFIX)
}

/// Whether a filename can take part in sync: representable in the index,
/// not reserved, and naming a plain entry directly under the sync root.
pub fn is_syncable_name(name: &str) -> bool {
    is_indexable_name(name) && !is_reserved_name(name) && is_flat_name(name)
}

fn is_flat_name(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(first)), None) if first == name
    )
}

/// Enumerate the regular files under `root`.
pub fn scan_dir(root: &Path) -> Result<ScanResult> {
    let scan_err = |source| SyncError::Scan {
        path: root.to_path_buf(),
        source,
    };

    let mut result = ScanResult::default();

    for entry in fs::read_dir(root).map_err(scan_err)? {
        let entry = entry.map_err(scan_err)?;
        let file_type = entry.file_type().map_err(scan_err)?;
        if !file_type.is_file() {
            continue;
        }

        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            tracing::warn!(name = ?name, "Skipping file with non UTF-8 name");
            result.skipped.push(name.to_string_lossy().into_owned());
            continue;
        };

        if is_reserved_name(name) {
            continue;
        }

        if !is_syncable_name(name) {
            tracing::warn!(name, "Skipping file whose name cannot be indexed");
            result.skipped.push(name.to_string());
            continue;
        }

        result.files.push(name.to_string());
    }

    result.files.sort();
    result.skipped.sort();
    Ok(result)
}

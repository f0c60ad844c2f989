//! Watch directory listing

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;

/// List input files directly inside `dir` whose extension matches
/// `extension` (ASCII case-insensitive, no leading dot).
///
/// Subdirectories are not entered. The result is sorted by file name so
/// repeated runs visit files in the same order. A missing directory is
/// created and yields an empty list.
pub fn scan(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        debug!(dir = %dir.display(), "Watch directory missing, creating it");
        std::fs::create_dir_all(dir)?;
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));

        if matches {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!(dir = %dir.display(), count = files.len(), "Scanned watch directory");

    Ok(files)
}

//! Moving processed files out of the watch directory

use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{IngestError, Result};

/// Timestamp inserted before the extension, second resolution
pub const ARCHIVE_STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Upper bound on `_N` suffixes tried when a name is taken
const MAX_COLLISION_SUFFIX: u32 = 1000;

/// Moves files into the archive directory as `<stem>_<YYYYMMDDHHMMSS>.<ext>`
#[derive(Debug, Clone)]
pub struct FileArchiver {
    archive_dir: PathBuf,
}

impl FileArchiver {
    pub fn new(archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            archive_dir: archive_dir.into(),
        }
    }

    /// Move `source` into the archive directory, stamped with the current
    /// local time. Returns the new path.
    ///
    /// On failure the source file is left where it was.
    pub fn archive(&self, source: &Path) -> Result<PathBuf> {
        self.archive_at(source, Local::now())
    }

    pub fn archive_at(&self, source: &Path, when: DateTime<Local>) -> Result<PathBuf> {
        if !source.is_file() {
            return Err(IngestError::archive(source, "source is not a regular file"));
        }

        fs::create_dir_all(&self.archive_dir).map_err(|e| {
            IngestError::archive(source, format!("cannot create archive directory: {}", e))
        })?;

        let stamp = when.format(ARCHIVE_STAMP_FORMAT).to_string();
        let destination = self.free_destination(source, &stamp)?;

        move_file(source, &destination)?;
        debug!(from = %source.display(), to = %destination.display(), "Archived file");

        Ok(destination)
    }

    fn free_destination(&self, source: &Path, stamp: &str) -> Result<PathBuf> {
        for attempt in 0..=MAX_COLLISION_SUFFIX {
            let candidate = self.archive_dir.join(archived_name(source, stamp, attempt));
            if !candidate.exists() {
                return Ok(candidate);
            }
        }

        Err(IngestError::archive(
            source,
            format!("no free archive name after {} attempts", MAX_COLLISION_SUFFIX),
        ))
    }
}

/// `<stem>_<stamp>[_<attempt>].<ext>`; the suffix is omitted for attempt 0.
pub fn archived_name(source: &Path, stamp: &str, attempt: u32) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut name = format!("{}_{}", stem, stamp);
    if attempt > 0 {
        name.push_str(&format!("_{}", attempt));
    }
    if let Some(ext) = source.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    name
}

/// Rename, falling back to copy and remove when the directories are on
/// different file systems.
fn move_file(source: &Path, destination: &Path) -> Result<()> {
    let rename_err = match fs::rename(source, destination) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    debug!(error = %rename_err, "Rename failed, copying instead");

    if let Err(e) = fs::copy(source, destination) {
        // Leave no half-written copy behind
        let _ = fs::remove_file(destination);
        return Err(IngestError::archive(
            source,
            format!("{} (copy fallback: {})", rename_err, e),
        ));
    }

    if let Err(e) = fs::remove_file(source) {
        warn!(file = %source.display(), error = %e, "Copied file but could not remove source");
        let _ = fs::remove_file(destination);
        return Err(IngestError::archive(source, format!("cannot remove source: {}", e)));
    }

    Ok(())
}

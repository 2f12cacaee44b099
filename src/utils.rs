use crate::Result;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

/// Latest modification time of a save.
///
/// For a directory this is the newest mtime of any file in the subtree
/// (the epoch when there are no files). For a file it is its own mtime.
pub fn latest_write_time(path: &Path) -> Result<DateTime<Utc>> {
    let metadata = fs::metadata(path)?;

    if !metadata.is_dir() {
        return Ok(DateTime::<Utc>::from(metadata.modified()?));
    }

    let mut latest = DateTime::<Utc>::from(UNIX_EPOCH);
    for entry in WalkDir::new(path).min_depth(1).follow_links(true) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let metadata = entry.metadata().map_err(std::io::Error::from)?;
        let modified = DateTime::<Utc>::from(metadata.modified()?);
        if modified > latest {
            latest = modified;
        }
    }

    Ok(latest)
}

/// Locate a file given by the operator.
///
/// Absolute paths are used as-is. Relative paths are looked up in the
/// working directory first, then next to the executable.
pub fn locate_file(path: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        return path.is_file().then(|| path.to_path_buf());
    }

    let candidates = [
        std::env::current_dir().ok().map(|dir| dir.join(path)),
        executable_dir().map(|dir| dir.join(path)),
    ];

    candidates.into_iter().flatten().find(|candidate| candidate.is_file())
}

/// Directory containing the running executable
pub fn executable_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Format byte size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: u64 = 1024;

    if bytes < THRESHOLD {
        return format!("{bytes} B");
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD as f64 && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD as f64;
        unit_index += 1;
    }

    let unit = UNITS[unit_index];
    format!("{size:.1} {unit}")
}

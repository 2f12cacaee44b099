use crate::error::SnapError;
use crate::Result;
use chrono::{DateTime, TimeZone};
use std::fmt;
use std::path::{Path, PathBuf};

/// Timestamp layout embedded in snapshot names. Zero-padded, so name order
/// is chronological order.
pub const SNAPSHOT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

pub const PERMANENT_MARKER: &str = "perm";
pub const TEMPORARY_MARKER: &str = "temp";

/// Normalize a save selector: lower-case, spaces and underscores
/// become hyphens.
pub fn normalize(name: &str) -> String {
    name.to_lowercase().replace([' ', '_'], "-")
}

/// Normalize a snapshot note: spaces and underscores become hyphens, case
/// is kept.
pub fn normalize_note(note: &str) -> String {
    note.replace([' ', '_'], "-")
}

/// Key used for change tracking and retention grouping of one save.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackupId(String);

impl BackupId {
    pub fn new(short_name: &str, selector: Option<&str>) -> Self {
        match selector {
            Some(selector) => Self(format!("{short_name}_{}", normalize(selector))),
            None => Self(short_name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BackupId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Build `{id}_{yyyy-MM-dd_HH-mm-ss}_{perm|temp}[_{note}].zip`
pub fn snapshot_file_name<Tz>(
    id: &BackupId,
    timestamp: &DateTime<Tz>,
    permanent: bool,
    note: Option<&str>,
) -> Result<String>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let marker = if permanent {
        PERMANENT_MARKER
    } else {
        TEMPORARY_MARKER
    };
    let timestamp_str = timestamp.format(SNAPSHOT_TIMESTAMP_FORMAT);

    let name = match note.map(normalize_note).filter(|n| !n.is_empty()) {
        Some(note) => format!("{id}_{timestamp_str}_{marker}_{note}.zip"),
        None => format!("{id}_{timestamp_str}_{marker}.zip"),
    };

    validate_filesystem_chars(&name)?;
    Ok(name)
}

/// Resolve filename collisions by adding `_N` before `.zip`.
///
/// Notes never contain `_`, so the counter is unambiguous, and `_` sorts
/// after `.`, so `x_1.zip` comes after `x.zip` in name order.
pub fn resolve_collision(base_path: &Path) -> Result<PathBuf> {
    if !base_path.exists() {
        return Ok(base_path.to_path_buf());
    }

    let parent = base_path.parent().unwrap_or(Path::new("."));
    let filename = base_path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| SnapError::validation("Invalid snapshot filename"))?;
    let stem = filename.strip_suffix(".zip").unwrap_or(filename);

    for counter in 1..=9999 {
        let new_path = parent.join(format!("{stem}_{counter}.zip"));
        if !new_path.exists() {
            return Ok(new_path);
        }
    }

    Err(SnapError::validation("Too many snapshot collisions (>9999)"))
}

/// Validate that the filename doesn't contain problematic characters
fn validate_filesystem_chars(filename: &str) -> Result<()> {
    // Characters that are problematic on Windows, plus path separators
    const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '/', '\\'];

    let invalid_chars: String = filename
        .chars()
        .filter(|c| INVALID_CHARS.contains(c))
        .collect();
    if !invalid_chars.is_empty() {
        return Err(SnapError::validation(format!(
            "Snapshot name '{filename}' contains invalid characters: {invalid_chars}"
        )));
    }

    if filename.chars().any(|c| c.is_control()) {
        return Err(SnapError::validation(
            "Snapshot name contains control characters",
        ));
    }

    Ok(())
}

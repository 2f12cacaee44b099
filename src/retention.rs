//! Deletes superseded temporary snapshots.

use crate::error::SnapError;
use crate::naming::{BackupId, TEMPORARY_MARKER};
use crate::Result;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default number of temporary snapshots kept per save
pub const DEFAULT_KEEP_COUNT: usize = 10;

#[derive(Debug, Default)]
pub struct PruneReport {
    /// Temporary snapshots found for the id
    pub candidates: usize,
    /// Deleted (or, in a dry run, would be deleted) snapshots with their sizes
    pub deleted: Vec<(PathBuf, u64)>,
    pub failures: Vec<SnapError>,
    pub bytes_freed: u64,
}

/// Matches `{id}_yyyy-MM-dd_HH-mm-ss_temp*.zip`. Captures the timestamp and
/// the `_N` collision counter, if any.
fn temp_snapshot_pattern(id: &BackupId) -> Result<Regex> {
    let pattern = format!(
        r"^{}_(\d{{4}}-\d{{2}}-\d{{2}}_\d{{2}}-\d{{2}}-\d{{2}})_{}.*?(?:_(\d+))?\.zip$",
        regex::escape(id.as_str()),
        TEMPORARY_MARKER
    );
    Regex::new(&pattern)
        .map_err(|e| SnapError::validation(format!("Invalid snapshot pattern for '{id}': {e}")))
}

/// Temporary snapshots of `id` in `backup_dir`, oldest first
pub fn temp_snapshots(id: &BackupId, backup_dir: &Path) -> Result<Vec<(PathBuf, u64)>> {
    if !backup_dir.is_dir() {
        return Ok(Vec::new());
    }

    let pattern = temp_snapshot_pattern(id)?;
    let mut snapshots = Vec::new();

    for entry in fs::read_dir(backup_dir)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let Some(captures) = pattern.captures(&name) else {
            continue;
        };
        let timestamp = captures[1].to_string();
        let counter = captures
            .get(2)
            .and_then(|c| c.as_str().parse::<u32>().ok())
            .unwrap_or(0);

        let metadata = entry.metadata()?;
        if metadata.is_file() {
            snapshots.push(((timestamp, counter, name), entry.path(), metadata.len()));
        }
    }

    // Same-second snapshots are ordered by their numeric collision counter
    snapshots.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(snapshots
        .into_iter()
        .map(|(_, path, size)| (path, size))
        .collect())
}

/// Delete all but the newest `keep_count` temporary snapshots of `id`.
///
/// Each deletion stands alone: a failure is recorded in the report and the
/// remaining snapshots are still processed.
pub fn prune(id: &BackupId, backup_dir: &Path, keep_count: usize, dry_run: bool) -> Result<PruneReport> {
    let snapshots = temp_snapshots(id, backup_dir)?;
    Ok(delete_oldest(snapshots, keep_count, dry_run))
}

/// Delete all but the last `keep_count` of `snapshots`, which are oldest first
fn delete_oldest(snapshots: Vec<(PathBuf, u64)>, keep_count: usize, dry_run: bool) -> PruneReport {
    let mut report = PruneReport {
        candidates: snapshots.len(),
        ..PruneReport::default()
    };

    let delete_count = snapshots.len().saturating_sub(keep_count);
    for (path, size) in snapshots.into_iter().take(delete_count) {
        if dry_run {
            report.deleted.push((path, size));
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), size, "snapshot deleted");
                report.bytes_freed += size;
                report.deleted.push((path, size));
            }
            Err(source) => {
                warn!(path = %path.display(), error = %source, "failed to delete snapshot");
                report
                    .failures
                    .push(SnapError::DeletionFailure { path, source });
            }
        }
    }

    report
}

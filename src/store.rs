//! Persisted `backup id → last seen modification time` map.
//!
//! The file is a flat JSON object of id → RFC 3339 instant. It is only
//! rewritten when a value actually changed.

use crate::error::SnapError;
use crate::naming::BackupId;
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug)]
pub struct TimestampStore {
    path: PathBuf,
    entries: BTreeMap<String, DateTime<Utc>>,
    dirty: bool,
}

impl TimestampStore {
    /// Load the store from `path`. A missing file gives an empty store; an
    /// unreadable or corrupt one is an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if !path.exists() {
            info!(path = %path.display(), "timestamp database not found, starting empty");
            return Ok(Self::empty(path));
        }

        let file = File::open(&path)
            .map_err(|e| SnapError::store(&path, format!("failed to open: {e}")))?;
        let entries: Option<BTreeMap<String, DateTime<Utc>>> =
            serde_json::from_reader(BufReader::new(file))
                .map_err(|e| SnapError::store(&path, format!("failed to parse: {e}")))?;
        let entries = entries.unwrap_or_default();

        debug!(path = %path.display(), entries = entries.len(), "timestamp database loaded");
        Ok(Self {
            path,
            entries,
            dirty: false,
        })
    }

    /// A store with no entries that will be written to `path` on flush
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, id: &BackupId) -> bool {
        self.entries.contains_key(id.as_str())
    }

    pub fn get(&self, id: &BackupId) -> Option<DateTime<Utc>> {
        self.entries.get(id.as_str()).copied()
    }

    /// Record `timestamp` for `id`. Returns whether the stored value changed.
    pub fn set(&mut self, id: &BackupId, timestamp: DateTime<Utc>) -> bool {
        let previous = self.entries.insert(id.as_str().to_string(), timestamp);
        let changed = previous != Some(timestamp);
        self.dirty |= changed;
        changed
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Persist the store if anything changed since the last flush.
    /// Returns whether the file was written.
    pub fn flush(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }

        write_json_atomic(&self.path, &self.entries)?;
        self.dirty = false;
        debug!(path = %self.path.display(), entries = self.entries.len(), "timestamp database written");
        Ok(true)
    }
}

/// Write JSON to a file atomically (write to temp, then rename)
fn write_json_atomic(path: &Path, data: &BTreeMap<String, DateTime<Utc>>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| SnapError::store(path, format!("failed to create directory: {e}")))?;
    }

    let temp_path = path.with_extension("json.tmp");

    let file = File::create(&temp_path)
        .map_err(|e| SnapError::store(path, format!("failed to create temp file: {e}")))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, data)
        .map_err(|e| SnapError::store(path, format!("failed to serialize: {e}")))?;
    writer
        .flush()
        .map_err(|e| SnapError::store(path, format!("failed to write: {e}")))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| SnapError::store(path, format!("failed to sync: {e}")))?;

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        SnapError::store(path, format!("failed to replace file: {e}"))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn id(name: &str) -> BackupId {
        BackupId::new(name, None)
    }

    #[test]
    fn test_missing_file_gives_empty_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backup-db.json");

        let store = TimestampStore::load(&path).unwrap();
        assert!(store.is_empty());
        assert!(!store.is_dirty());
        // Nothing is written until something changes
        assert!(!path.exists());
    }

    #[test]
    fn test_set_marks_dirty_only_on_change() {
        let dir = tempdir().unwrap();
        let mut store = TimestampStore::empty(dir.path().join("db.json"));
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap();

        assert!(store.set(&id("g"), t1));
        assert!(store.is_dirty());
        assert!(store.contains(&id("g")));
        assert_eq!(store.get(&id("g")), Some(t1));

        assert!(store.flush().unwrap());
        assert!(!store.is_dirty());

        assert!(!store.set(&id("g"), t1));
        assert!(!store.is_dirty());

        assert!(store.set(&id("g"), t2));
        assert!(store.is_dirty());
    }

    #[test]
    fn test_second_unchanged_set_keeps_earlier_dirty_flag() {
        let mut store = TimestampStore::empty("unused.json");
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        store.set(&id("a"), t);
        store.set(&id("a"), t);
        assert!(store.is_dirty());
    }

    #[test]
    fn test_flush_noop_does_not_rewrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.json");
        fs::write(&path, "{}").unwrap();

        let mut store = TimestampStore::load(&path).unwrap();
        assert!(!store.flush().unwrap());

        // The file was left untouched
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn test_round_trip_keeps_sub_second_precision() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("db.json");
        let t = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();

        let mut store = TimestampStore::empty(&path);
        store.set(&BackupId::new("g", Some("My Save")), t);
        store.set(&id("other"), Utc.timestamp_opt(0, 0).unwrap());
        store.flush().unwrap();

        let reloaded = TimestampStore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get(&BackupId::new("g", Some("my-save"))), Some(t));
        assert!(!dir.path().join("nested").join("db.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.json");
        fs::write(&path, "{ not json").unwrap();

        match TimestampStore::load(&path) {
            Err(SnapError::StoreIo { path: p, .. }) => assert_eq!(p, path),
            other => panic!("Expected StoreIo, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_timestamp_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.json");
        fs::write(&path, r#"{"g": "yesterday"}"#).unwrap();

        assert!(TimestampStore::load(&path).is_err());
    }

    #[test]
    fn test_null_document_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.json");
        fs::write(&path, "null").unwrap();

        assert!(TimestampStore::load(&path).unwrap().is_empty());
    }
}

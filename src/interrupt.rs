use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Interrupt state and the archive files currently being written.
///
/// Cloning is cheap; the Ctrl-C handler holds one clone and the engine
/// another.
#[derive(Clone, Default)]
pub struct InterruptContext {
    interrupt_flag: Arc<AtomicBool>,
    active_archives: Arc<Mutex<HashSet<PathBuf>>>,
}

impl InterruptContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if an interrupt has been requested
    pub fn is_interrupted(&self) -> bool {
        self.interrupt_flag.load(Ordering::SeqCst)
    }

    pub fn set_interrupted(&self, interrupted: bool) {
        self.interrupt_flag.store(interrupted, Ordering::SeqCst);
    }

    /// Track an archive file that is being written
    pub fn register(&self, archive_path: PathBuf) -> ArchiveGuard {
        if let Ok(mut archives) = self.active_archives.lock() {
            archives.insert(archive_path.clone());
        }
        ArchiveGuard {
            archive_path,
            context: self.clone(),
            completed: false,
        }
    }

    pub fn active_archives(&self) -> Vec<PathBuf> {
        self.active_archives
            .lock()
            .map(|archives| archives.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove every archive that is still being written. Returns the
    /// paths that were removed.
    pub fn cleanup_active_archives(&self) -> Vec<PathBuf> {
        let mut removed = Vec::new();

        for archive_path in self.active_archives() {
            if !archive_path.exists() {
                continue;
            }
            match std::fs::remove_file(&archive_path) {
                Ok(()) => removed.push(archive_path),
                Err(e) => warn!(
                    path = %archive_path.display(),
                    error = %e,
                    "could not clean up incomplete archive"
                ),
            }
        }

        if let Ok(mut archives) = self.active_archives.lock() {
            archives.clear();
        }
        removed
    }

    fn forget(&self, archive_path: &Path) {
        if let Ok(mut archives) = self.active_archives.lock() {
            archives.remove(archive_path);
        }
    }
}

/// Keeps an in-flight archive registered until it is completed or dropped.
///
/// Dropping an uncompleted guard deletes the partial file, unless an
/// interrupt is pending; then the file stays registered for the Ctrl-C
/// handler to remove.
pub struct ArchiveGuard {
    archive_path: PathBuf,
    context: InterruptContext,
    completed: bool,
}

impl ArchiveGuard {
    pub fn path(&self) -> &Path {
        &self.archive_path
    }

    /// Mark the archive as finished; it will no longer be cleaned up
    pub fn complete(mut self) {
        self.context.forget(&self.archive_path);
        self.completed = true;
    }
}

impl Drop for ArchiveGuard {
    fn drop(&mut self) {
        if self.completed || self.context.is_interrupted() {
            return;
        }
        let _ = std::fs::remove_file(&self.archive_path);
        self.context.forget(&self.archive_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_guard_normal_completion() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("g_temp.zip");
        fs::write(&archive, "zip").unwrap();

        let context = InterruptContext::new();
        let guard = context.register(archive.clone());
        assert!(context.active_archives().contains(&archive));
        assert_eq!(guard.path(), archive.as_path());

        guard.complete();

        assert!(context.active_archives().is_empty());
        assert!(archive.exists());
    }

    #[test]
    fn test_guard_dropped_on_failure_removes_partial_file() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("partial.zip");
        fs::write(&archive, "half").unwrap();

        let context = InterruptContext::new();
        {
            let _guard = context.register(archive.clone());
        }

        assert!(!archive.exists());
        assert!(context.active_archives().is_empty());
    }

    #[test]
    fn test_interrupted_guard_leaves_cleanup_to_handler() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("interrupted.zip");
        fs::write(&archive, "half").unwrap();

        let context = InterruptContext::new();
        {
            let _guard = context.register(archive.clone());
            context.set_interrupted(true);
            assert!(context.is_interrupted());
        }

        assert!(archive.exists());
        assert!(context.active_archives().contains(&archive));

        let removed = context.cleanup_active_archives();
        assert_eq!(removed, vec![archive.clone()]);
        assert!(!archive.exists());
        assert!(context.active_archives().is_empty());
    }

    #[test]
    fn test_cleanup_nonexistent_archives() {
        let dir = tempdir().unwrap();
        let context = InterruptContext::new();
        let _guard = context.register(dir.path().join("never-written.zip"));

        assert!(context.cleanup_active_archives().is_empty());
        assert!(context.active_archives().is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let context = InterruptContext::new();
        let handler_side = context.clone();
        handler_side.set_interrupted(true);
        assert!(context.is_interrupted());
    }
}

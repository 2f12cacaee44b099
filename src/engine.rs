//! Backup decision engine.
//!
//! One run for one save goes: resolve the target, compare its latest write
//! time with the stored one, archive when needed, record the observed time,
//! then optionally prune old temporary snapshots.

use crate::archive::{create_archive, ArchiveSummary};
use crate::config::Config;
use crate::error::SnapError;
use crate::interrupt::InterruptContext;
use crate::naming::{resolve_collision, snapshot_file_name, BackupId};
use crate::resolver::{self, GameListing, ResolvedSave, SaveTarget};
use crate::retention::{self, PruneReport, DEFAULT_KEEP_COUNT};
use crate::store::TimestampStore;
use crate::utils::latest_write_time;
use crate::Result;
use chrono::{DateTime, Local, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Per-run switches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOptions {
    /// Free text appended to the snapshot name
    pub note: Option<String>,
    /// Mark the snapshot permanent; it is never pruned and always taken
    pub permanent: bool,
    /// Prune old temporary snapshots after the run
    pub clear: bool,
    /// Take a snapshot even if the save has not changed
    pub force: bool,
    /// Record the current state as backed up without archiving
    pub omit: bool,
    /// Decide and report, but don't touch the filesystem
    pub dry_run: bool,
    pub keep_count: usize,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            note: None,
            permanent: false,
            clear: false,
            force: false,
            omit: false,
            dry_run: false,
            keep_count: DEFAULT_KEEP_COUNT,
        }
    }
}

#[derive(Debug)]
pub enum Decision {
    Created(ArchiveSummary),
    /// Dry run: the snapshot that would have been written
    WouldCreate(PathBuf),
    Unchanged,
    Omitted,
}

impl Decision {
    pub fn archive_path(&self) -> Option<&Path> {
        match self {
            Decision::Created(summary) => Some(&summary.archive_path),
            Decision::WouldCreate(path) => Some(path),
            Decision::Unchanged | Decision::Omitted => None,
        }
    }
}

#[derive(Debug)]
pub struct BackupOutcome {
    pub game: String,
    pub id: BackupId,
    pub target: SaveTarget,
    /// Directory holding this game's snapshots
    pub backup_dir: PathBuf,
    pub decision: Decision,
    pub latest_write_time: DateTime<Utc>,
    pub previous_write_time: Option<DateTime<Utc>>,
    pub pruned: Option<PruneReport>,
    /// Timestamp database could not be written; the snapshot itself is kept
    pub store_warning: Option<SnapError>,
    pub ignored_selector: Option<String>,
}

#[derive(Debug)]
pub struct BatchFailure {
    pub game: String,
    pub selector: Option<String>,
    pub error: SnapError,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub outcomes: Vec<BackupOutcome>,
    pub failures: Vec<BatchFailure>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn created_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.decision, Decision::Created(_)))
            .count()
    }
}

pub struct BackupEngine {
    config: Config,
    store: TimestampStore,
    context: InterruptContext,
}

impl BackupEngine {
    pub fn new(config: Config, store: TimestampStore, context: InterruptContext) -> Self {
        Self {
            config,
            store,
            context,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &TimestampStore {
        &self.store
    }

    pub fn into_store(self) -> TimestampStore {
        self.store
    }

    /// Snapshot directory of a configured game
    pub fn backup_dir_for(&self, game: &str) -> Result<PathBuf> {
        let game = self.config.game(game)?;
        Ok(self.config.backup_dir_for(game))
    }

    /// Every game with its saves
    pub fn list(&self) -> Vec<GameListing<'_>> {
        resolver::list_all(&self.config)
    }

    /// Back up one save of one game
    pub fn backup(
        &mut self,
        game: &str,
        selector: Option<&str>,
        options: &BackupOptions,
    ) -> Result<BackupOutcome> {
        let profile = self.config.game(game)?;
        let resolved = resolver::resolve(profile, selector)?;
        let backup_dir = self.config.backup_dir_for(profile);

        run(
            &mut self.store,
            &self.context,
            game,
            resolved,
            backup_dir,
            options,
        )
    }

    /// Back up an already resolved save of `game`
    pub fn backup_resolved(
        &mut self,
        game: &str,
        resolved: ResolvedSave,
        options: &BackupOptions,
    ) -> Result<BackupOutcome> {
        let profile = self.config.game(game)?;
        let backup_dir = self.config.backup_dir_for(profile);

        run(
            &mut self.store,
            &self.context,
            game,
            resolved,
            backup_dir,
            options,
        )
    }

    /// Back up every save of every game.
    ///
    /// Failures for one save (or one game's enumeration) are collected and
    /// the run moves on. Only unrecoverable errors end the batch early.
    pub fn backup_all(&mut self, options: &BackupOptions) -> Result<BatchOutcome> {
        let mut batch = BatchOutcome::default();

        for profile in self.config.games() {
            let targets = match resolver::saves(profile) {
                Ok(targets) => targets,
                Err(error) => {
                    warn!(game = %profile.short_name, %error, "could not enumerate saves");
                    batch.failures.push(BatchFailure {
                        game: profile.short_name.clone(),
                        selector: None,
                        error,
                    });
                    continue;
                }
            };

            let backup_dir = self.config.backup_dir_for(profile);
            for target in targets {
                let selector = target.selector.clone();
                let resolved = ResolvedSave::from_target(profile, target);

                match run(
                    &mut self.store,
                    &self.context,
                    &profile.short_name,
                    resolved,
                    backup_dir.clone(),
                    options,
                ) {
                    Ok(outcome) => batch.outcomes.push(outcome),
                    Err(error) if error.is_recoverable() => {
                        warn!(game = %profile.short_name, ?selector, %error, "backup failed");
                        batch.failures.push(BatchFailure {
                            game: profile.short_name.clone(),
                            selector,
                            error,
                        });
                    }
                    Err(error) => return Err(error),
                }
            }
        }

        info!(
            created = batch.created_count(),
            processed = batch.outcomes.len(),
            failed = batch.failures.len(),
            "batch finished"
        );
        Ok(batch)
    }
}

fn run(
    store: &mut TimestampStore,
    context: &InterruptContext,
    game: &str,
    resolved: ResolvedSave,
    backup_dir: PathBuf,
    options: &BackupOptions,
) -> Result<BackupOutcome> {
    if context.is_interrupted() {
        return Err(SnapError::Interrupted);
    }

    let ResolvedSave {
        target,
        id,
        ignored_selector,
    } = resolved;

    if !target.path.exists() {
        return Err(SnapError::TargetNotFound {
            path: target.path.clone(),
        });
    }

    let latest = latest_write_time(&target.path)?;
    let previous = store.get(&id);
    let changed = previous.map_or(true, |stored| latest > stored);
    let needed = changed || options.permanent || options.force;
    debug!(%id, %latest, ?previous, needed, "staleness checked");

    let decision = if options.omit {
        Decision::Omitted
    } else if !needed {
        Decision::Unchanged
    } else {
        let file_name = snapshot_file_name(
            &id,
            &Local::now(),
            options.permanent,
            options.note.as_deref(),
        )?;
        let destination = resolve_collision(&backup_dir.join(file_name))?;

        if options.dry_run {
            Decision::WouldCreate(destination)
        } else {
            let summary = create_archive(&target.path, &destination, context)?;
            info!(
                %id,
                archive = %summary.archive_path.display(),
                files = summary.files_archived,
                "snapshot created"
            );
            Decision::Created(summary)
        }
    };

    // Archived or not, the observed time is what the next run compares to
    store.set(&id, latest);
    let store_warning = if options.dry_run {
        None
    } else {
        store.flush().err().map(|error| {
            warn!(%id, %error, "timestamp database not updated");
            error
        })
    };

    let pruned = options
        .clear
        .then(|| prune(&id, &backup_dir, options.keep_count, options.dry_run));

    Ok(BackupOutcome {
        game: game.to_string(),
        id,
        target,
        backup_dir,
        decision,
        latest_write_time: latest,
        previous_write_time: previous,
        pruned,
        store_warning,
        ignored_selector,
    })
}

fn prune(id: &BackupId, backup_dir: &Path, keep_count: usize, dry_run: bool) -> PruneReport {
    retention::prune(id, backup_dir, keep_count, dry_run).unwrap_or_else(|error| {
        warn!(%id, %error, "could not scan for old snapshots");
        PruneReport {
            failures: vec![error],
            ..PruneReport::default()
        }
    })
}

//! Turns a (game, save selector) pair into a concrete filesystem target.

use crate::config::{Config, EntryKind, GameProfile, SaveStrategy};
use crate::error::SnapError;
use crate::naming::{normalize, BackupId};
use crate::Result;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// A save resolved to a path. `selector` is `None` when the game is
/// backed up as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveTarget {
    pub selector: Option<String>,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSave {
    pub target: SaveTarget,
    pub id: BackupId,
    /// Selector the operator supplied for a game that doesn't take one
    pub ignored_selector: Option<String>,
}

impl ResolvedSave {
    /// Build the resolution for a target that came out of [`saves`]
    pub fn from_target(game: &GameProfile, target: SaveTarget) -> Self {
        let id = BackupId::new(&game.short_name, target.selector.as_deref());
        Self {
            target,
            id,
            ignored_selector: None,
        }
    }
}

/// Enumerate every save of a game.
pub fn saves(game: &GameProfile) -> Result<Vec<SaveTarget>> {
    match &game.strategy {
        SaveStrategy::All => Ok(vec![SaveTarget {
            selector: None,
            path: game.save_root.clone(),
        }]),
        SaveStrategy::Map(entries) => Ok(entries
            .iter()
            .map(|(key, relative)| SaveTarget {
                selector: Some(key.clone()),
                path: game.save_root.join(relative),
            })
            .collect()),
        SaveStrategy::List { pattern, kind } => {
            let read_dir = fs::read_dir(&game.save_root).map_err(|e| {
                SnapError::validation(format!(
                    "Failed to list saves in '{}': {e}",
                    game.save_root.display()
                ))
            })?;

            let mut entries = Vec::new();
            for entry in read_dir {
                let entry = entry?;
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                if !pattern.is_match(&name) {
                    continue;
                }

                let path = entry.path();
                let wanted = match kind {
                    EntryKind::Any => true,
                    EntryKind::Files => path.is_file(),
                    EntryKind::Directories => path.is_dir(),
                };
                if wanted {
                    entries.push((name, path));
                }
            }
            entries.sort();

            Ok(entries
                .into_iter()
                .map(|(name, path)| SaveTarget {
                    selector: Some(normalize(&name)),
                    path,
                })
                .collect())
        }
    }
}

/// Resolve the save the operator asked for.
pub fn resolve(game: &GameProfile, selector: Option<&str>) -> Result<ResolvedSave> {
    let resolved = match &game.strategy {
        SaveStrategy::All => ResolvedSave {
            target: SaveTarget {
                selector: None,
                path: game.save_root.clone(),
            },
            id: BackupId::new(&game.short_name, None),
            ignored_selector: selector.map(str::to_string),
        },
        SaveStrategy::Map(entries) => {
            let wanted = selector.map(str::to_lowercase);
            let found = wanted
                .as_deref()
                .and_then(|wanted| entries.iter().find(|(key, _)| key == wanted));

            match found {
                Some((key, relative)) => ResolvedSave::from_target(
                    game,
                    SaveTarget {
                        selector: Some(key.clone()),
                        path: game.save_root.join(relative),
                    },
                ),
                None => {
                    return Err(SnapError::SelectorNotValid {
                        message: format!(
                            "Value of parameter 'save' is expected to be one of the defined keys in 'gameConfigs[shortName: {}].saveMap'",
                            game.short_name
                        ),
                        available: entries.iter().map(|(key, _)| key.clone()).collect(),
                    })
                }
            }
        }
        SaveStrategy::List { .. } => {
            let candidates = saves(game)?;
            let wanted = selector.map(normalize);
            let matching: Vec<&SaveTarget> = candidates
                .iter()
                .filter(|c| wanted.is_some() && c.selector == wanted)
                .collect();

            if let [target] = matching.as_slice() {
                ResolvedSave::from_target(game, (*target).clone())
            } else {
                let message = if wanted.is_none() {
                    "You need to set the 'save' parameter to the name of the save file/folder you want to back up".to_string()
                } else if matching.is_empty() {
                    format!(
                        "No save named '{}' found in '{}'",
                        selector.unwrap_or_default(),
                        game.save_root.display()
                    )
                } else {
                    format!(
                        "Save name '{}' is ambiguous in '{}'",
                        selector.unwrap_or_default(),
                        game.save_root.display()
                    )
                };
                return Err(SnapError::SelectorNotValid {
                    message,
                    available: candidates.iter().filter_map(|c| c.selector.clone()).collect(),
                });
            }
        }
    };

    debug!(
        game = %game.short_name,
        id = %resolved.id,
        path = %resolved.target.path.display(),
        "save resolved"
    );
    Ok(resolved)
}

/// One game in the "list supported games" listing.
#[derive(Debug)]
pub struct GameListing<'a> {
    pub game: &'a GameProfile,
    /// Save selectors, or why they could not be enumerated
    pub saves: std::result::Result<Vec<String>, String>,
}

/// List every game with its saves. A game whose saves can't be enumerated
/// is reported as such; the others are still listed.
pub fn list_all(config: &Config) -> Vec<GameListing<'_>> {
    config
        .games()
        .iter()
        .map(|game| GameListing {
            game,
            saves: saves(game)
                .map(|targets| targets.into_iter().filter_map(|t| t.selector).collect())
                .map_err(|e| e.to_string()),
        })
        .collect()
}

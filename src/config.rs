//! Game configuration document.
//!
//! The document is deserialized into [`RawConfig`], which mirrors the file
//! and tolerates missing fields. [`RawConfig::validate_and_build`] checks
//! everything in one pass, applies variable substitution, and produces an
//! immutable [`Config`].

use crate::error::SnapError;
use crate::Result;
use regex::{NoExpand, Regex, RegexBuilder};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Pattern used by LIST games that don't define `savePattern`.
pub const MATCH_ALL_PATTERN: &str = ".+";

/// Key/value pairs in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderedMap(pub Vec<(String, Option<String>)>);

impl<'de> Deserialize<'de> for OrderedMap {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedMapVisitor;

        impl<'de> Visitor<'de> for OrderedMapVisitor {
            type Value = OrderedMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of strings")
            }

            fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, Option<String>>()? {
                    entries.push((key, value));
                }
                Ok(OrderedMap(entries))
            }
        }

        deserializer.deserialize_map(OrderedMapVisitor)
    }
}

/// The configuration document as written by the operator.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfig {
    pub variables: Option<OrderedMap>,
    pub backups_dir_path: Option<String>,
    pub game_configs: Option<Vec<Option<RawGameConfig>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGameConfig {
    pub short_name: Option<String>,
    pub full_name: Option<String>,
    pub backup_dir_name: Option<String>,
    pub backup_method: Option<String>,
    pub save_dir_path: Option<String>,
    pub save_map: Option<OrderedMap>,
    pub save_pattern: Option<String>,
}

/// Which filesystem entries a LIST game considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Any,
    Files,
    Directories,
}

/// How a game's saves are addressed.
#[derive(Debug, Clone)]
pub enum SaveStrategy {
    /// The whole save root is one unit.
    All,
    /// Named saves, each a path relative to the save root.
    Map(Vec<(String, PathBuf)>),
    /// Every matching entry directly under the save root is a save.
    List { pattern: Regex, kind: EntryKind },
}

impl SaveStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            SaveStrategy::All => "all",
            SaveStrategy::Map(_) => "map",
            SaveStrategy::List { .. } => "list",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GameProfile {
    pub short_name: String,
    pub full_name: String,
    pub backup_dir_name: String,
    pub save_root: PathBuf,
    pub strategy: SaveStrategy,
}

/// `$name` → value table. Names are stored lower-cased with the `$` prefix.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    entries: Vec<(String, String, Regex)>,
}

impl VariableTable {
    pub fn contains(&self, name: &str) -> bool {
        let key = variable_key(name);
        self.entries.iter().any(|(k, _, _)| *k == key)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let key = variable_key(name);
        self.entries
            .iter()
            .find(|(k, _, _)| *k == key)
            .map(|(_, v, _)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, name: &str, value: String) -> Result<()> {
        let key = variable_key(name);
        let matcher = RegexBuilder::new(&regex::escape(&key))
            .case_insensitive(true)
            .build()
            .map_err(|e| SnapError::config(format!("Invalid variable name '{name}': {e}")))?;
        self.entries.push((key, value, matcher));
        // Longest names first so `$game` never clobbers `$gamedir`
        self.entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Ok(())
    }

    /// Replace every known `$name` in `raw`, ignoring case.
    pub fn substitute(&self, raw: &str) -> String {
        if !raw.contains('$') {
            return raw.to_string();
        }

        let mut data = raw.to_string();
        for (_, value, matcher) in &self.entries {
            data = matcher.replace_all(&data, NoExpand(value.as_str())).into_owned();
        }
        data
    }
}

fn variable_key(name: &str) -> String {
    let name = name.strip_prefix('$').unwrap_or(name);
    format!("${}", name.to_lowercase())
}

/// Validated, substituted configuration.
#[derive(Debug, Clone)]
pub struct Config {
    backups_dir: PathBuf,
    games: Vec<GameProfile>,
    index: HashMap<String, usize>,
    variables: VariableTable,
}

impl Config {
    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    /// Directory that holds the snapshots of one game.
    pub fn backup_dir_for(&self, game: &GameProfile) -> PathBuf {
        self.backups_dir.join(&game.backup_dir_name)
    }

    /// All games, in document order.
    pub fn games(&self) -> &[GameProfile] {
        &self.games
    }

    pub fn contains_game(&self, short_name: &str) -> bool {
        self.index.contains_key(short_name)
    }

    pub fn game(&self, short_name: &str) -> Result<&GameProfile> {
        self.index
            .get(short_name)
            .map(|&i| &self.games[i])
            .ok_or_else(|| SnapError::GameNotFound {
                game: short_name.to_string(),
            })
    }

    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }
}

impl RawConfig {
    /// Check the whole document, collecting every problem, and build the
    /// immutable [`Config`].
    pub fn validate_and_build(self) -> Result<Config> {
        let mut errors = Vec::new();

        let mut variables = VariableTable::default();
        match &self.variables {
            None => errors.push(
                "[Config] Invalid value in 'variables', or missing definition. Map {} expected"
                    .to_string(),
            ),
            Some(OrderedMap(entries)) => {
                for (name, value) in entries {
                    if variables.contains(name) {
                        errors.push(format!("[Config] Variable '{name}' already defined"));
                        continue;
                    }
                    let value = variables.substitute(value.as_deref().unwrap_or_default());
                    if let Err(e) = variables.insert(name, value) {
                        errors.push(e.to_string());
                    }
                }
            }
        }

        let backups_dir = match &self.backups_dir_path {
            Some(path) if !path.trim().is_empty() => Some(PathBuf::from(variables.substitute(path))),
            _ => {
                errors.push(
                    "[Config] Invalid value in 'backupsDirPath', or missing definition. String expected"
                        .to_string(),
                );
                None
            }
        };

        let mut games = Vec::new();
        let mut index = HashMap::new();
        match self.game_configs {
            None => errors.push(
                "[Config] Invalid value in 'gameConfigs', or missing definition. List [] expected"
                    .to_string(),
            ),
            Some(raw_games) => {
                for (i, raw) in raw_games.into_iter().enumerate() {
                    let Some(raw) = raw else {
                        errors.push(format!(
                            "[Config] Invalid value in 'gameConfigs[{i}]', or missing definition. Map {{}} expected"
                        ));
                        continue;
                    };

                    let short_name = match raw.short_name.as_deref().map(str::trim) {
                        Some(name) if !name.is_empty() => name.to_string(),
                        _ => {
                            errors.push(format!(
                                "[Config] Invalid value in 'gameConfigs[{i}].shortName', or missing definition. String expected"
                            ));
                            continue;
                        }
                    };

                    if index.contains_key(&short_name) {
                        errors.push(format!(
                            "[Config] Duplicate value '{short_name}' in 'gameConfigs[{i}].shortName'. A game with this shortName is already defined"
                        ));
                    }

                    if let Some(game) = raw.build(&short_name, &variables, &mut errors) {
                        if !index.contains_key(&short_name) {
                            index.insert(short_name, games.len());
                            games.push(game);
                        }
                    }
                }
            }
        }

        if !errors.is_empty() {
            return Err(SnapError::ConfigInvalid { errors });
        }

        debug!(
            games = games.len(),
            variables = variables.len(),
            "configuration validated"
        );

        Ok(Config {
            backups_dir: backups_dir.unwrap_or_default(),
            games,
            index,
            variables,
        })
    }
}

impl RawGameConfig {
    fn build(
        self,
        short_name: &str,
        variables: &VariableTable,
        errors: &mut Vec<String>,
    ) -> Option<GameProfile> {
        let errors_before = errors.len();
        let field = |name: &str| format!("'gameConfigs[shortName: {short_name}].{name}'");
        let missing = |name: &str| {
            format!(
                "[Config] Invalid value in {}, or missing definition. String expected",
                field(name)
            )
        };

        if self.full_name.is_none() {
            errors.push(missing("fullName"));
        }
        if self.backup_dir_name.is_none() {
            errors.push(missing("backupDirName"));
        }
        if self.save_dir_path.is_none() {
            errors.push(missing("saveDirPath"));
        }

        let strategy = match self.backup_method.as_deref() {
            None => {
                errors.push(missing("backupMethod"));
                None
            }
            Some(method) => match method.to_lowercase().as_str() {
                "all" => Some(SaveStrategy::All),
                "map" => build_save_map(self.save_map, variables, &field, errors),
                "list" => build_list(self.save_pattern, EntryKind::Any, &field, errors),
                "listf" => build_list(self.save_pattern, EntryKind::Files, &field, errors),
                "listd" => build_list(self.save_pattern, EntryKind::Directories, &field, errors),
                _ => {
                    errors.push(format!(
                        "[Config] Invalid value '{method}' in {}. Allowed values: all, map, list",
                        field("backupMethod")
                    ));
                    None
                }
            },
        };

        if errors.len() > errors_before {
            return None;
        }

        Some(GameProfile {
            short_name: short_name.to_string(),
            full_name: self.full_name.unwrap_or_default(),
            backup_dir_name: self.backup_dir_name.unwrap_or_default(),
            save_root: PathBuf::from(variables.substitute(&self.save_dir_path.unwrap_or_default())),
            strategy: strategy?,
        })
    }
}

fn build_save_map(
    save_map: Option<OrderedMap>,
    variables: &VariableTable,
    field: &dyn Fn(&str) -> String,
    errors: &mut Vec<String>,
) -> Option<SaveStrategy> {
    let Some(OrderedMap(entries)) = save_map else {
        errors.push(format!(
            "[Config] Invalid value in {}, or missing definition. Map {{}} expected",
            field("saveMap")
        ));
        return None;
    };

    if entries.is_empty() {
        errors.push(format!(
            "[Config] Invalid value in {}. At least one save expected",
            field("saveMap")
        ));
        return None;
    }

    let mut saves = Vec::with_capacity(entries.len());
    let mut valid = true;
    for (key, value) in entries {
        if key.trim().is_empty() {
            errors.push(format!(
                "[Config] Invalid key name in {}. Can not be empty or white space",
                field("saveMap")
            ));
            valid = false;
            continue;
        }
        match value {
            Some(value) if !value.trim().is_empty() => {
                saves.push((key, PathBuf::from(variables.substitute(&value))));
            }
            _ => {
                errors.push(format!(
                    "[Config] Invalid value in {}. Can not be null, empty, or white space",
                    field(&format!("saveMap[{key}]"))
                ));
                valid = false;
            }
        }
    }

    valid.then_some(SaveStrategy::Map(saves))
}

fn build_list(
    save_pattern: Option<String>,
    kind: EntryKind,
    field: &dyn Fn(&str) -> String,
    errors: &mut Vec<String>,
) -> Option<SaveStrategy> {
    let pattern = save_pattern
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| MATCH_ALL_PATTERN.to_string());

    match Regex::new(&pattern) {
        Ok(pattern) => Some(SaveStrategy::List { pattern, kind }),
        Err(e) => {
            errors.push(format!(
                "[Config] Invalid regular expression in {}: {e}",
                field("savePattern")
            ));
            None
        }
    }
}

/// Supported configuration document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Pick the format from the file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "json" => Ok(ConfigFormat::Json),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            _ => Err(SnapError::config(format!(
                "Unsupported config type '.{extension}'. Use .json, or .yaml/.yml (extension must match the type)"
            ))),
        }
    }
}

/// Parse a configuration document without validating it
pub fn parse_config(data: &str, format: ConfigFormat) -> Result<RawConfig> {
    let raw: Option<RawConfig> = match format {
        ConfigFormat::Json => serde_json::from_str(data)
            .map_err(|e| SnapError::config(format!("Failed to parse JSON config data: {e}")))?,
        ConfigFormat::Yaml => serde_yaml::from_str(data)
            .map_err(|e| SnapError::config(format!("Failed to parse YAML config data: {e}")))?,
    };

    raw.ok_or_else(|| SnapError::config("No data loaded from the config file"))
}

/// Load, parse and validate the configuration file at `path`
pub fn load_config(path: &Path) -> Result<Config> {
    let format = ConfigFormat::from_path(path)?;
    let data = fs::read_to_string(path).map_err(|e| {
        SnapError::config(format!(
            "Failed to load config data from '{}': {e}",
            path.display()
        ))
    })?;

    debug!(path = %path.display(), ?format, "loading configuration");
    parse_config(&data, format)?.validate_and_build()
}

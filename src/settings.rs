use crate::error::SnapError;
use crate::retention::DEFAULT_KEEP_COUNT;
use crate::Result;
use configparser::ini::Ini;
use std::path::{Path, PathBuf};

const SECTION: &str = "savesnap";

/// Tool preferences from `settings.ini`. Command line flags override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub config_file: PathBuf,
    pub database_file: PathBuf,
    pub keep_count: usize,
    /// Prune old snapshots on every run, as if `--clear` was given
    pub always_clear: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            config_file: PathBuf::from("backup-config.yaml"),
            database_file: PathBuf::from("backup-db.json"),
            keep_count: DEFAULT_KEEP_COUNT,
            always_clear: false,
        }
    }
}

/// Load settings from the per-user settings file, falling back to defaults
pub fn load_settings() -> Result<Settings> {
    load_settings_from(&settings_path()?)
}

/// Load settings from `path`. A missing file gives the defaults.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }

    let mut conf = Ini::new();
    conf.load(path)
        .map_err(|e| SnapError::config(format!("Failed to parse settings file: {e}")))?;

    let mut settings = Settings::default();

    if let Some(value) = conf.get(SECTION, "config_file") {
        settings.config_file = PathBuf::from(value);
    }
    if let Some(value) = conf.get(SECTION, "database_file") {
        settings.database_file = PathBuf::from(value);
    }
    if let Some(value) = conf.get(SECTION, "keep_count") {
        settings.keep_count = value
            .parse()
            .map_err(|_| SnapError::config(format!("Invalid keep_count: {value}")))?;
    }
    if let Some(value) = conf.get(SECTION, "always_clear") {
        settings.always_clear = parse_bool(&value).unwrap_or(settings.always_clear);
    }

    Ok(settings)
}

/// Get the settings file path for the current platform
pub fn settings_path() -> Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return Ok(PathBuf::from(appdata).join("savesnap").join("settings.ini"));
        }
    }

    if let Some(config_dir) = std::env::var_os("XDG_CONFIG_HOME") {
        Ok(PathBuf::from(config_dir).join("savesnap").join("settings.ini"))
    } else if let Some(home) = std::env::var_os("HOME") {
        Ok(PathBuf::from(home)
            .join(".config")
            .join("savesnap")
            .join("settings.ini"))
    } else {
        Err(SnapError::config("Could not determine settings directory"))
    }
}

/// Parse a boolean value from INI string
fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

/// Sample settings file with every key at its default
pub fn create_sample_settings() -> String {
    format!(
        r#"[{SECTION}]
# Game configuration document (.yaml, .yml or .json)
config_file = backup-config.yaml

# Timestamp database; created next to the executable if not found
database_file = backup-db.json

# Temporary snapshots kept per save when pruning
keep_count = {DEFAULT_KEEP_COUNT}

# Prune on every run (true/false)
always_clear = false
"#
    )
}

/// Display the effective settings
pub fn dump_settings(settings: &Settings) -> Result<()> {
    let path = settings_path()?;

    println!("savesnap Settings");
    println!("=================");
    println!();

    if path.exists() {
        println!("Settings file: {} (found)", path.display());
    } else {
        println!("Settings file: {} (not found, using defaults)", path.display());
    }
    println!();

    println!("Current Settings:");
    println!("----------------");
    println!("config_file   = {}", settings.config_file.display());
    println!("database_file = {}", settings.database_file.display());
    println!("keep_count    = {}", settings.keep_count);
    println!("always_clear  = {}", settings.always_clear);
    println!();

    if !path.exists() {
        println!("To create a settings file, save this as {}:", path.display());
        println!();
        print!("{}", create_sample_settings());
    }

    Ok(())
}

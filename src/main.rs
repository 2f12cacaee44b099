use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use savesnap::engine::{BackupEngine, BackupOptions, BackupOutcome, BatchOutcome, Decision};
use savesnap::utils::executable_dir;
use savesnap::{
    dump_settings, format_size, load_config, load_settings, locate_file, InterruptContext,
    PruneReport, Result, SaveStrategy, Settings, SnapError, TimestampStore,
};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const LIST_COMMAND: &str = "list";
const ALL_COMMAND: &str = "all";

fn main() {
    let result = run();
    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(error) => {
            eprintln!("Error: {error}");

            // Show suggestions if available
            let suggestions = error.suggestions();
            if !suggestions.is_empty() {
                eprintln!("\nSuggestions:");
                for suggestion in suggestions {
                    eprintln!("  - {suggestion}");
                }
            }

            process::exit(error.exit_code());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Verbosity {
    /// Errors only
    SuperQuiet,
    /// Errors and warnings
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    fn from_matches(matches: &ArgMatches) -> Self {
        if matches.get_flag("super-quiet") {
            Verbosity::SuperQuiet
        } else if matches.get_flag("quiet") {
            Verbosity::Quiet
        } else if matches.get_flag("verbose") {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }
}

/// Operator-facing output. Diagnostics go through `tracing` instead.
struct Console {
    verbosity: Verbosity,
}

impl Console {
    fn info(&self, message: impl AsRef<str>) {
        if self.verbosity >= Verbosity::Normal {
            println!("{}", message.as_ref());
        }
    }

    fn detail(&self, message: impl AsRef<str>) {
        if self.verbosity >= Verbosity::Verbose {
            println!("  {}", message.as_ref());
        }
    }

    fn warn(&self, message: impl AsRef<str>) {
        if self.verbosity >= Verbosity::Quiet {
            eprintln!("Warning: {}", message.as_ref());
        }
    }

    fn error(&self, scope: &str, error: &SnapError) {
        eprintln!("Error: [{scope}] {error}");
        if self.verbosity >= Verbosity::Verbose {
            for suggestion in error.suggestions() {
                eprintln!("  - {suggestion}");
            }
        }
    }
}

fn build_cli() -> Command {
    Command::new("savesnap")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Snapshot game saves into timestamped zip archives, only when they changed")
        .long_about(
            "savesnap backs up game saves described in a YAML or JSON config file.\n\
             A snapshot is only taken when the save changed since the last one.\n\
             Example: savesnap minecraft -s \"My World\" → minecraft_my-world_2024-05-01_18-30-00_temp.zip",
        )
        .arg(
            Arg::new("game")
                .help("Short name of the game, 'list' to list games and saves, 'all' to back up everything")
                .required_unless_present("dump-settings")
                .value_name("GAME"),
        )
        .arg(
            Arg::new("save")
                .short('s')
                .long("save")
                .help("Save to back up (map key or save file/folder name)")
                .value_name("SAVE"),
        )
        .arg(
            Arg::new("note")
                .short('n')
                .long("note")
                .help("Note appended to the snapshot name")
                .value_name("NOTE"),
        )
        .arg(
            Arg::new("permanent")
                .short('p')
                .long("permanent")
                .help("Take a permanent snapshot; it is never deleted when pruning")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("clear")
                .short('c')
                .long("clear")
                .help("Delete old temporary snapshots, keeping the newest ones")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("keep-count")
                .short('k')
                .long("keep-count")
                .help("Temporary snapshots to keep when clearing")
                .value_name("COUNT")
                .value_parser(value_parser!(u64).range(2..=99999)),
        )
        .arg(
            Arg::new("open")
                .short('o')
                .long("open")
                .help("Open the backup folder afterwards")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("force")
                .short('f')
                .long("force")
                .help("Take a snapshot even if the save did not change")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("omit")
                .short('m')
                .long("omit")
                .help("Don't take a snapshot, but remember the current save as backed up")
                .action(ArgAction::SetTrue)
                .conflicts_with_all(["force", "permanent", "note"]),
        )
        .arg(
            Arg::new("dry-run")
                .short('d')
                .long("dry-run")
                .help("Show what would be done without doing it")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .short('C')
                .long("config")
                .help("Game config file (.yaml, .yml or .json)")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("database")
                .short('D')
                .long("database")
                .help("Timestamp database file")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only show warnings and errors")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose"),
        )
        .arg(
            Arg::new("super-quiet")
                .short('Q')
                .long("super-quiet")
                .help("Only show errors")
                .action(ArgAction::SetTrue)
                .conflicts_with_all(["verbose", "quiet"]),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Show details and debug logging")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dump-settings")
                .long("dump-settings")
                .help("Display current settings and exit")
                .action(ArgAction::SetTrue),
        )
}

fn run() -> Result<i32> {
    let matches = build_cli().get_matches();
    let verbosity = Verbosity::from_matches(&matches);
    init_tracing(verbosity);
    let console = Console { verbosity };

    let settings = load_settings().unwrap_or_else(|e| {
        console.warn(format!("Could not load settings, using defaults: {e}"));
        Settings::default()
    });

    if matches.get_flag("dump-settings") {
        dump_settings(&settings)?;
        return Ok(0);
    }

    let game = matches
        .get_one::<String>("game")
        .ok_or_else(|| SnapError::validation("No game specified. Use --help for usage information."))?;

    let config_name = matches
        .get_one::<PathBuf>("config")
        .unwrap_or(&settings.config_file);
    let config_path = locate_file(config_name).ok_or_else(|| {
        SnapError::config(format!("Config file '{}' not found", config_name.display()))
    })?;
    debug!(path = %config_path.display(), "using config file");
    let config = load_config(&config_path)?;

    let database_name = matches
        .get_one::<PathBuf>("database")
        .unwrap_or(&settings.database_file);
    let store = TimestampStore::load(database_path(database_name))?;

    let context = InterruptContext::new();
    setup_signal_handler(context.clone());

    let options = backup_options(&matches, &settings);
    let mut engine = BackupEngine::new(config, store, context.clone());

    let result = match game.as_str() {
        LIST_COMMAND => {
            print_listing(&engine);
            Ok(0)
        }
        ALL_COMMAND => run_all(&mut engine, &options, &console, &matches),
        _ => run_single(&mut engine, game, &options, &console, &matches),
    };

    if matches!(result, Err(SnapError::Interrupted)) {
        context.cleanup_active_archives();
    }
    result
}

fn init_tracing(verbosity: Verbosity) {
    let default_filter = if verbosity == Verbosity::Verbose {
        "savesnap=debug"
    } else {
        "error"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Where the timestamp database lives. An existing file is looked up like
/// the config file; a new one goes next to the executable.
fn database_path(name: &Path) -> PathBuf {
    if let Some(found) = locate_file(name) {
        return found;
    }
    if name.is_absolute() {
        return name.to_path_buf();
    }
    executable_dir()
        .map(|dir| dir.join(name))
        .unwrap_or_else(|| name.to_path_buf())
}

fn backup_options(matches: &ArgMatches, settings: &Settings) -> BackupOptions {
    let keep_count = matches
        .get_one::<u64>("keep-count")
        .map(|&count| count as usize)
        .unwrap_or(settings.keep_count);

    BackupOptions {
        note: matches.get_one::<String>("note").cloned(),
        permanent: matches.get_flag("permanent"),
        clear: matches.get_flag("clear") || settings.always_clear,
        force: matches.get_flag("force"),
        omit: matches.get_flag("omit"),
        dry_run: matches.get_flag("dry-run"),
        keep_count,
    }
}

fn run_single(
    engine: &mut BackupEngine,
    game: &str,
    options: &BackupOptions,
    console: &Console,
    matches: &ArgMatches,
) -> Result<i32> {
    let selector = matches.get_one::<String>("save").map(String::as_str);
    let outcome = engine.backup(game, selector, options)?;
    report_outcome(&outcome, options, console);

    if matches.get_flag("open") && !options.dry_run {
        open_folder(&outcome.backup_dir, console);
    }
    Ok(0)
}

fn run_all(
    engine: &mut BackupEngine,
    options: &BackupOptions,
    console: &Console,
    matches: &ArgMatches,
) -> Result<i32> {
    if matches.get_one::<String>("save").is_some() {
        console.warn("Option 'save' is ignored when backing up all games");
    }

    let batch = engine.backup_all(options)?;
    report_batch(&batch, options, console);

    if matches.get_flag("open") && !options.dry_run {
        open_folder(engine.config().backups_dir(), console);
    }
    Ok(if batch.is_success() { 0 } else { 1 })
}

fn print_listing(engine: &BackupEngine) {
    for listing in engine.list() {
        let game = listing.game;
        println!(
            "{} - {} ({})",
            game.short_name,
            game.full_name,
            game.strategy.name()
        );
        if matches!(game.strategy, SaveStrategy::All) {
            continue;
        }

        match &listing.saves {
            Ok(saves) if saves.is_empty() => println!("    (no saves found)"),
            Ok(saves) => {
                for save in saves {
                    println!("    {save}");
                }
            }
            Err(message) => println!("    (saves unavailable: {message})"),
        }
    }
}

fn report_outcome(outcome: &BackupOutcome, options: &BackupOptions, console: &Console) {
    if let Some(selector) = &outcome.ignored_selector {
        console.warn(format!(
            "Game '{}' is backed up as a whole; ignoring save '{selector}'",
            outcome.game
        ));
    }

    match &outcome.decision {
        Decision::Created(summary) => {
            console.info(format!(
                "Backed up '{}' to {} ({} files, {})",
                outcome.id,
                summary.archive_path.display(),
                summary.files_archived,
                format_size(summary.total_size)
            ));
            console.detail(format!("Source: {}", outcome.target.path.display()));
        }
        Decision::WouldCreate(path) => {
            console.info(format!("Would back up '{}' to {}", outcome.id, path.display()));
        }
        Decision::Unchanged => {
            console.info(format!(
                "'{}' has not changed since the last backup. Nothing to do",
                outcome.id
            ));
        }
        Decision::Omitted => {
            console.info(format!(
                "Skipped backup of '{}'; the current save is recorded as backed up",
                outcome.id
            ));
        }
    }

    console.detail(format!("Last modified: {}", outcome.latest_write_time.to_rfc3339()));
    if let Some(previous) = outcome.previous_write_time {
        console.detail(format!("Previously recorded: {}", previous.to_rfc3339()));
    }

    if let Some(error) = &outcome.store_warning {
        console.warn(error.to_string());
    }

    if let Some(report) = &outcome.pruned {
        report_prune(report, options.dry_run, console);
    }
}

fn report_prune(report: &PruneReport, dry_run: bool, console: &Console) {
    if !report.deleted.is_empty() {
        let verb = if dry_run { "Would delete" } else { "Deleted" };
        let size: u64 = report.deleted.iter().map(|(_, size)| size).sum();
        console.info(format!(
            "{verb} {} old snapshot(s), {}",
            report.deleted.len(),
            format_size(size)
        ));
        for (path, _) in &report.deleted {
            console.detail(path.display().to_string());
        }
    }

    for failure in &report.failures {
        console.warn(failure.to_string());
    }
}

fn report_batch(batch: &BatchOutcome, options: &BackupOptions, console: &Console) {
    for outcome in &batch.outcomes {
        report_outcome(outcome, options, console);
    }

    for failure in &batch.failures {
        let scope = match &failure.selector {
            Some(selector) => format!("{} / {selector}", failure.game),
            None => failure.game.clone(),
        };
        console.error(&scope, &failure.error);
    }

    let unchanged = batch
        .outcomes
        .iter()
        .filter(|o| matches!(o.decision, Decision::Unchanged))
        .count();
    console.info(format!(
        "Backup summary: {} created, {unchanged} unchanged, {} failed",
        batch.created_count(),
        batch.failures.len()
    ));
}

fn open_folder(path: &Path, console: &Console) {
    let program = if cfg!(target_os = "windows") {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };

    if let Err(e) = process::Command::new(program).arg(path).spawn() {
        warn!(program, error = %e, "could not launch file browser");
        console.warn(format!("Could not open '{}': {e}", path.display()));
    }
}

fn setup_signal_handler(context: InterruptContext) {
    let result = ctrlc::set_handler(move || {
        context.set_interrupted(true);
        eprintln!("\nInterrupted by user. Cleaning up...");

        for path in context.cleanup_active_archives() {
            debug!(path = %path.display(), "removed incomplete archive");
        }

        process::exit(130);
    });

    if let Err(e) = result {
        warn!(error = %e, "could not install Ctrl-C handler");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn parse(args: &[&str]) -> ArgMatches {
        build_cli().try_get_matches_from(args).unwrap()
    }

    #[test]
    fn test_cli_definition_is_valid() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_backup_options_from_flags() {
        let matches = parse(&[
            "savesnap", "g", "-s", "slot", "-n", "Boss Fight", "-p", "-c", "-k", "5", "-d",
        ]);
        let options = backup_options(&matches, &Settings::default());

        assert_eq!(options.note.as_deref(), Some("Boss Fight"));
        assert!(options.permanent);
        assert!(options.clear);
        assert!(options.dry_run);
        assert!(!options.force);
        assert!(!options.omit);
        assert_eq!(options.keep_count, 5);
    }

    #[test]
    fn test_settings_supply_defaults() {
        let settings = Settings {
            keep_count: 7,
            always_clear: true,
            ..Settings::default()
        };
        let options = backup_options(&parse(&["savesnap", "g"]), &settings);

        assert_eq!(options.keep_count, 7);
        assert!(options.clear);
    }

    #[test]
    fn test_keep_count_range() {
        assert!(build_cli()
            .try_get_matches_from(["savesnap", "g", "-k", "1"])
            .is_err());
        assert!(build_cli()
            .try_get_matches_from(["savesnap", "g", "-k", "100000"])
            .is_err());
        assert!(build_cli()
            .try_get_matches_from(["savesnap", "g", "-k", "99999"])
            .is_ok());
    }

    #[test]
    fn test_omit_conflicts_with_force() {
        assert!(build_cli()
            .try_get_matches_from(["savesnap", "g", "-m", "-f"])
            .is_err());
    }

    #[test]
    fn test_game_required_unless_dumping_settings() {
        assert!(build_cli().try_get_matches_from(["savesnap"]).is_err());
        assert!(build_cli()
            .try_get_matches_from(["savesnap", "--dump-settings"])
            .is_ok());
    }

    #[test]
    fn test_verbosity() {
        assert_eq!(Verbosity::from_matches(&parse(&["savesnap", "g"])), Verbosity::Normal);
        assert_eq!(Verbosity::from_matches(&parse(&["savesnap", "g", "-q"])), Verbosity::Quiet);
        assert_eq!(
            Verbosity::from_matches(&parse(&["savesnap", "g", "-Q"])),
            Verbosity::SuperQuiet
        );
        assert_eq!(Verbosity::from_matches(&parse(&["savesnap", "g", "-v"])), Verbosity::Verbose);
        assert!(Verbosity::SuperQuiet < Verbosity::Quiet);
    }

    #[test]
    fn test_database_path() {
        let dir = tempdir().unwrap();
        let existing = dir.path().join("db.json");
        std::fs::write(&existing, "{}").unwrap();
        assert_eq!(database_path(&existing), existing);

        let missing = dir.path().join("missing.json");
        assert_eq!(database_path(&missing), missing);

        let relative = database_path(Path::new("savesnap-test-missing-db.json"));
        assert!(relative.is_absolute());
        assert!(relative.ends_with("savesnap-test-missing-db.json"));
    }
}

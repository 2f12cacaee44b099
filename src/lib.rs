pub mod archive;
pub mod config;
pub mod engine;
pub mod error;
pub mod interrupt;
pub mod naming;
pub mod resolver;
pub mod retention;
pub mod settings;
pub mod store;
pub mod utils;

pub use archive::{create_archive, ArchiveSummary};
pub use config::{load_config, Config, GameProfile, SaveStrategy};
pub use engine::{BackupEngine, BackupOptions, BackupOutcome, BatchFailure, BatchOutcome, Decision};
pub use error::SnapError;
pub use interrupt::InterruptContext;
pub use naming::{normalize, normalize_note, BackupId};
pub use resolver::{GameListing, ResolvedSave, SaveTarget};
pub use retention::{prune, PruneReport};
pub use settings::{dump_settings, load_settings, Settings};
pub use store::TimestampStore;
pub use utils::{format_size, latest_write_time, locate_file};

/// Main library result type
pub type Result<T> = std::result::Result<T, SnapError>;

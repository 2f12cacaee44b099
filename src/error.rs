use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapError {
    #[error("Config data not valid ({} problem(s) found)", errors.len())]
    ConfigInvalid { errors: Vec<String> },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Can not back up '{game}'. No such game is configured")]
    GameNotFound { game: String },

    #[error("{message}")]
    SelectorNotValid {
        message: String,
        available: Vec<String>,
    },

    #[error("Save at '{path}' does not exist. Nothing to back up")]
    TargetNotFound { path: PathBuf },

    #[error("Failed to create directory '{path}': {source}")]
    DirectoryCreateFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Backup '{path}' failed: {message}")]
    ArchiveFailure { path: PathBuf, message: String },

    #[error("Timestamp database '{path}': {message}")]
    StoreIo { path: PathBuf, message: String },

    #[error("Failed to delete '{path}': {source}")]
    DeletionFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation interrupted by user")]
    Interrupted,

    #[error("Validation error: {message}")]
    Validation { message: String },
}

impl SnapError {
    /// Create a configuration error with a custom message
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a validation error with a custom message
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an archive failure for the snapshot at `path`
    pub fn archive(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::ArchiveFailure {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a timestamp database error for `path`
    pub fn store(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::StoreIo {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Check if this error is recoverable (batch mode moves on to the next save)
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            SnapError::ConfigInvalid { .. }
                | SnapError::Config { .. }
                | SnapError::StoreIo { .. }
                | SnapError::Interrupted
        )
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SnapError::Interrupted => 130,
            SnapError::SelectorNotValid { .. } => 3,
            SnapError::ArchiveFailure { .. } | SnapError::DirectoryCreateFailure { .. } => 4,
            SnapError::TargetNotFound { .. } => 5,
            _ => 1,
        }
    }

    /// Provide helpful suggestions for resolving the error
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            SnapError::ConfigInvalid { errors } => errors.clone(),
            SnapError::SelectorNotValid { available, .. } => {
                vec![format!("Available saves: [{}]", available.join(", "))]
            }
            SnapError::GameNotFound { .. } => {
                vec!["Run 'savesnap list' to see the configured games".to_string()]
            }
            SnapError::TargetNotFound { .. } => vec![
                "Check the saveDirPath of the game in the config file".to_string(),
                "Make sure the game has written at least one save".to_string(),
            ],
            SnapError::DirectoryCreateFailure { .. } | SnapError::ArchiveFailure { .. } => vec![
                "Check that backupsDirPath is writable".to_string(),
                "Free up disk space".to_string(),
            ],
            SnapError::StoreIo { .. } => vec![
                "Fix or remove the timestamp database file".to_string(),
                "Removing it makes the next run back up every save".to_string(),
            ],
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_creation() {
        let path = PathBuf::from("/test/path");

        let not_found = SnapError::TargetNotFound { path: path.clone() };
        assert!(format!("{}", not_found).contains("/test/path"));

        let invalid = SnapError::ConfigInvalid {
            errors: vec!["a".to_string(), "b".to_string()],
        };
        assert!(format!("{}", invalid).contains('2'));

        let store = SnapError::store(&path, "bad json");
        assert!(format!("{}", store).contains("bad json"));
    }

    #[test]
    fn test_config_and_validation_constructors() {
        match SnapError::config("Test config error") {
            SnapError::Config { message } => assert_eq!(message, "Test config error"),
            _ => panic!("Expected Config error"),
        }

        match SnapError::validation("Test validation error") {
            SnapError::Validation { message } => assert_eq!(message, "Test validation error"),
            _ => panic!("Expected Validation error"),
        }
    }

    #[test]
    fn test_is_recoverable() {
        let path = PathBuf::from("/test");

        assert!(SnapError::TargetNotFound { path: path.clone() }.is_recoverable());
        assert!(SnapError::archive(&path, "disk full").is_recoverable());
        assert!(SnapError::SelectorNotValid {
            message: "nope".to_string(),
            available: vec![],
        }
        .is_recoverable());

        assert!(!SnapError::Interrupted.is_recoverable());
        assert!(!SnapError::config("test").is_recoverable());
        assert!(!SnapError::store(&path, "corrupt").is_recoverable());
    }

    #[test]
    fn test_exit_codes() {
        let path = PathBuf::from("/test");

        assert_eq!(SnapError::Interrupted.exit_code(), 130);
        assert_eq!(SnapError::config("test").exit_code(), 1);
        assert_eq!(SnapError::ConfigInvalid { errors: vec![] }.exit_code(), 1);
        assert_eq!(
            SnapError::SelectorNotValid {
                message: String::new(),
                available: vec![],
            }
            .exit_code(),
            3
        );
        assert_eq!(SnapError::archive(&path, "x").exit_code(), 4);
        assert_eq!(
            SnapError::DirectoryCreateFailure {
                path: path.clone(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
            }
            .exit_code(),
            4
        );
        assert_eq!(SnapError::TargetNotFound { path }.exit_code(), 5);
    }

    #[test]
    fn test_suggestions() {
        let selector = SnapError::SelectorNotValid {
            message: "unknown save".to_string(),
            available: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(selector.suggestions(), vec!["Available saves: [a, b]"]);

        let invalid = SnapError::ConfigInvalid {
            errors: vec!["missing backupsDirPath".to_string()],
        };
        assert_eq!(invalid.suggestions(), vec!["missing backupsDirPath"]);

        assert!(SnapError::Interrupted.suggestions().is_empty());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let snap_error: SnapError = io_error.into();

        match snap_error {
            SnapError::Io(_) => (),
            _ => panic!("Expected IO error conversion"),
        }
    }
}

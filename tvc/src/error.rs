//! Error types for the tvc library

use std::path::PathBuf;

/// Result type alias for tvc operations
pub type Result<T> = std::result::Result<T, TvcError>;

/// Error type for repository, reconciliation and pull operations
#[derive(Debug, thiserror::Error)]
pub enum TvcError {
    /// Config file missing, unparseable or holding invalid values
    #[error("Config error at '{path}': {message}")]
    Config { path: PathBuf, message: String },

    /// Data directory missing, not a directory, or unreadable
    #[error("Directory error at '{path}': {message}")]
    Directory { path: PathBuf, message: String },

    /// File metadata could not be read, e.g. the file vanished after the scan
    #[error("Metadata error for '{path}': {message}")]
    Metadata { path: PathBuf, message: String },

    /// Hash computation errors
    #[error("Hash computation error for '{path}': {message}")]
    Hash { path: PathBuf, message: String },

    /// Snapshot log could not be read or written
    #[error("Snapshot log error at '{path}': {message}")]
    Snapshot { path: PathBuf, message: String },

    /// Extension rejected by validation
    #[error("'{0}' is not a valid file extension - expected '.' followed by a name without dots")]
    InvalidExtension(String),

    /// `.tvc` already present at init
    #[error("Repository already initialized at '{0}'")]
    AlreadyInitialized(PathBuf),

    /// No `.tvc` directory where one is required
    #[error("Not a tvc repository: '{0}' has no .tvc/config")]
    NotInitialized(PathBuf),

    /// File copying errors
    #[error("File copy error: {message}")]
    FileCopy { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A spawned task panicked or was cancelled
    #[error("Task failed: {0}")]
    Task(String),
}

impl TvcError {
    /// Create a new config error
    pub fn config_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new directory error
    pub fn directory_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Directory {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new metadata error
    pub fn metadata_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Metadata {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new hash error
    pub fn hash_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Hash {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new snapshot error
    pub fn snapshot_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Snapshot {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new file copy error
    pub fn copy_error(
        source: impl AsRef<std::path::Path>,
        dest: impl AsRef<std::path::Path>,
        message: impl Into<String>,
    ) -> Self {
        let full_message = format!(
            "File copy error from '{}' to '{}': {}",
            source.as_ref().display(),
            dest.as_ref().display(),
            message.into()
        );
        Self::FileCopy {
            message: full_message,
        }
    }

    /// Whether the error only affects a single file and the pass may continue
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Hash { .. } | Self::Metadata { .. })
    }
}

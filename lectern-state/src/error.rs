//! Error types for shared state operations

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for state operations
#[derive(Error, Debug)]
pub enum StateError {
    /// Backing file could not be read
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Backing file could not be written or replaced
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for state operations
pub type Result<T> = std::result::Result<T, StateError>;

impl StateError {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StateError::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StateError::Write {
            path: path.into(),
            source,
        }
    }
}

//! Error types for logger construction and level validation
//!
//! Steady-state logging never returns these; they surface from constructors,
//! `set_level`, and the individual writers.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, LogError>;

/// Errors produced while building a logger or changing its level
#[derive(Debug, Error)]
pub enum LogError {
    /// A level name outside debug/info/warn/error/fatal
    #[error("log level not valid: \"{0}\"")]
    InvalidLevel(String),

    /// The parent directory of a log file does not exist
    #[error("directory not exists: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// The parent of a log file exists but is not a directory
    #[error("path is not directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Opening, writing or reopening a file failed
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// A logger was built without any destination
    #[error("must specify the output for logger")]
    DestinationRequired,
}

impl LogError {
    /// Wrap an IO error with a short description of what was being attempted
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        LogError::Io {
            context: context.into(),
            source,
        }
    }
}

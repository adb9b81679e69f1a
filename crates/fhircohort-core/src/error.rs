use std::path::PathBuf;

use thiserror::Error;

/// Core error types for cohort operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid code file {path}: {message}")]
    InvalidCodeFile { path: PathBuf, message: String },

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CoreError {
    /// Create a new InvalidCodeFile error
    pub fn invalid_code_file(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidCodeFile {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

//! Error types for the dynamic configuration engine.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, DynConfigError>;

/// Errors that can occur while building, reloading, or reading configuration.
#[derive(Debug, Error)]
pub enum DynConfigError {
    /// A configuration source path does not exist.
    #[error("configuration source not found: {path}")]
    SourceNotFound {
        /// Path to the missing source.
        path: PathBuf,
    },

    /// A configuration source exists but could not be read or parsed.
    #[error("invalid configuration source {path}: {message}")]
    InvalidSource {
        /// Path to the source.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// The engine has not been initialized, or was terminated.
    #[error("dynamic config is not initialized")]
    Uninitialized,

    /// Termination was requested but the build did not use a custom executor.
    #[error("termination is not allowed when useCustomExecutor is disabled")]
    UnsupportedTermination,

    /// A stored value could not be coerced to the requested type.
    #[error("value {value:?} for key {key:?} cannot be read as {target}")]
    TypeMismatch {
        /// The configuration key.
        key: String,
        /// The raw stored value.
        value: String,
        /// Name of the requested type.
        target: &'static str,
    },

    /// The filesystem watcher could not be created or registered.
    #[error("file watch error: {0}")]
    Watch(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DynConfigError {
    /// Create a new source-not-found error.
    pub fn source_not_found(path: impl Into<PathBuf>) -> Self {
        Self::SourceNotFound { path: path.into() }
    }

    /// Create a new invalid-source error.
    pub fn invalid_source(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidSource {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new type-mismatch error.
    pub fn type_mismatch(
        key: impl Into<String>,
        value: impl Into<String>,
        target: &'static str,
    ) -> Self {
        Self::TypeMismatch {
            key: key.into(),
            value: value.into(),
            target,
        }
    }

    /// Create a new watch error.
    pub fn watch(message: impl Into<String>) -> Self {
        Self::Watch(message.into())
    }
}

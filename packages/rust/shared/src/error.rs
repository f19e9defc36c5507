//! Error types for autopress.
//!
//! Library crates use [`AutopressError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all autopress operations.
#[derive(Debug, thiserror::Error)]
pub enum AutopressError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to a source, provider, or publisher.
    #[error("network error: {0}")]
    Network(String),

    /// JSON/YAML/feed parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A persisted record does not exist.
    #[error("record not found at {path:?}")]
    NotFound { path: PathBuf },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (missing field, bad value, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Research lookup or draft generation error.
    #[error("generation error: {0}")]
    Generation(String),

    /// Publishing target rejected or failed a submission.
    #[error("publish error: {0}")]
    Publish(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AutopressError>;

impl AutopressError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

//! Error types for DealScout.
//!
//! Library crates use [`DealScoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for all DealScout operations.
#[derive(Debug, thiserror::Error)]
pub enum DealScoutError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to a remote collaborator.
    #[error("network error: {0}")]
    Network(String),

    /// A remote extraction operation returned something unusable.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Caller input rejected before a run starts (missing keywords, no sources, ...).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A remote call exceeded its time budget.
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// A single source's processor failed. The orchestrator recovers from
    /// this locally; it is never surfaced as a run-level error.
    #[error("source {source_id} failed: {cause}")]
    SourceProcessing {
        source_id: String,
        cause: Box<DealScoutError>,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DealScoutError>;

impl DealScoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Attribute an error to the source that produced it.
    ///
    /// Already-attributed errors are passed through unchanged so a cause is
    /// never wrapped twice.
    pub fn source(source_id: impl Into<String>, cause: DealScoutError) -> Self {
        match cause {
            already @ Self::SourceProcessing { .. } => already,
            other => Self::SourceProcessing {
                source_id: source_id.into(),
                cause: Box::new(other),
            },
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this is a caller-input validation failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

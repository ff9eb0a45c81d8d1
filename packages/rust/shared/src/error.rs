//! Error types for glossgen.
//!
//! Library crates use [`GlossgenError`] via `thiserror`.
//! The CLI app wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all glossgen operations.
#[derive(Debug, thiserror::Error)]
pub enum GlossgenError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Error from an upstream HTTP API (search, scrape, completion).
    ///
    /// `status` is set when the upstream answered with a non-success HTTP
    /// status; transport-level failures (DNS, refused connection) carry `None`.
    #[error("upstream error: {message}")]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Response parsing or content extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Data validation error (bad input, malformed record, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Workflow engine error (unknown run, corrupt step record, etc.).
    #[error("workflow error: {0}")]
    Workflow(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GlossgenError>;

impl GlossgenError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an upstream error, carrying the HTTP status when known.
    pub fn upstream(status: Option<u16>, msg: impl Into<String>) -> Self {
        Self::Upstream {
            status,
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

    /// HTTP status code of an upstream error, if one was recorded.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => *status,
            _ => None,
        }
    }
}

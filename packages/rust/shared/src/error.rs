//! Error types for LeadLens.
//!
//! Library crates use [`LeadLensError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all LeadLens operations.
#[derive(Debug, thiserror::Error)]
pub enum LeadLensError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to a resolver or external service.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed payload or identifier.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// The requested lead does not exist in the record store.
    #[error("lead not found: {lead_id}")]
    NotFound { lead_id: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad domain, out-of-range value, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LeadLensError>;

impl LeadLensError {
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

    /// Create a not-found error for a lead identifier.
    pub fn not_found(lead_id: impl ToString) -> Self {
        Self::NotFound {
            lead_id: lead_id.to_string(),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = LeadLensError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = LeadLensError::not_found("0192-abc");
        assert_eq!(err.to_string(), "lead not found: 0192-abc");

        let err = LeadLensError::validation("confidence 140 out of range");
        assert!(err.to_string().contains("confidence 140"));
    }
}

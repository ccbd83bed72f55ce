//! Error types for the brain.
//!
//! Storage, configuration and request-validation failures all funnel into
//! [`BrainError`]. Lookups that simply find nothing are not errors; they are
//! reported as `None` by the store and engine APIs.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the brain crate.
#[derive(Debug, Error)]
pub enum BrainError {
    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Request errors
    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    #[error("Sequence not found: {hash}")]
    SequenceNotFound { hash: String },

    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for brain operations.
pub type Result<T> = std::result::Result<T, BrainError>;

impl From<std::io::Error> for BrainError {
    fn from(err: std::io::Error) -> Self {
        BrainError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for BrainError {
    fn from(err: serde_json::Error) -> Self {
        BrainError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for BrainError {
    fn from(err: rusqlite::Error) -> Self {
        BrainError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl BrainError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        BrainError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// - -32601: Method not found
    /// - -32602: Invalid params
    /// - -32002: Sequence not found
    /// - -32603: Internal error
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            BrainError::MethodNotFound { .. } => -32601,
            BrainError::InvalidParams { .. } => -32602,
            BrainError::SequenceNotFound { .. } => -32002,
            _ => -32603,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BrainError::SequenceNotFound {
            hash: "the\u{1f}quick\u{1f}fox".into(),
        };
        assert!(err.to_string().starts_with("Sequence not found: the"));

        let err = BrainError::Config {
            message: "backing path is empty".into(),
        };
        assert_eq!(err.to_string(), "Configuration error: backing path is empty");
    }

    #[test]
    fn test_rpc_error_codes() {
        assert_eq!(
            BrainError::InvalidParams {
                message: "missing text".into()
            }
            .to_rpc_error_code(),
            -32602
        );
        assert_eq!(
            BrainError::SequenceNotFound { hash: "x".into() }.to_rpc_error_code(),
            -32002
        );
        assert_eq!(
            BrainError::MethodNotFound {
                method: "nope".into()
            }
            .to_rpc_error_code(),
            -32601
        );
        assert_eq!(BrainError::Other("boom".into()).to_rpc_error_code(), -32603);
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: BrainError = io.into();
        assert!(matches!(err, BrainError::Io { path: None, .. }));
    }
}

//! Error types for the Chia daemon API layer.
//!
//! Every failure the transport adapter can observe is folded into [`ChiaError`]
//! so that query results carry one uniform error type regardless of whether the
//! cause was a missing configuration, a broken socket or a remote command error.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the Chia API layer.
#[derive(Debug, Error)]
pub enum ChiaError {
    // Precondition errors
    #[error("Client configuration is not defined. Call initialize_config before issuing requests")]
    NotInitialized,

    // Connection errors
    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Connection to the daemon was closed")]
    Disconnected,

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("TLS error: {message}")]
    Tls { message: String },

    // Remote errors
    #[error("Command {command} failed: {message}")]
    Remote { command: String, message: String },

    #[error("Unknown command {command} for {target}")]
    UnknownCommand { target: String, command: String },

    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    // Validation errors
    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Chia API operations.
pub type Result<T> = std::result::Result<T, ChiaError>;

impl From<std::io::Error> for ChiaError {
    fn from(err: std::io::Error) -> Self {
        ChiaError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for ChiaError {
    fn from(err: serde_json::Error) -> Self {
        ChiaError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ChiaError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        match err {
            tokio_tungstenite::tungstenite::Error::ConnectionClosed
            | tokio_tungstenite::tungstenite::Error::AlreadyClosed => ChiaError::Disconnected,
            other => ChiaError::Connection {
                message: other.to_string(),
            },
        }
    }
}

impl From<native_tls::Error> for ChiaError {
    fn from(err: native_tls::Error) -> Self {
        ChiaError::Tls {
            message: err.to_string(),
        }
    }
}

impl ChiaError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ChiaError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Check if this error is transient and a caller-side retry may succeed.
    ///
    /// The transport layer itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChiaError::Connection { .. } | ChiaError::Disconnected | ChiaError::Timeout(_)
        )
    }
}

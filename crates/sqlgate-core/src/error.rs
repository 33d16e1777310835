//! Error types for sqlgate

use thiserror::Error;

/// Core error type for gateway operations
#[derive(Error, Debug)]
pub enum SqlgateError {
    /// The database could not be reached, or refused the connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// A statement failed: bad SQL, constraint violation, procedure exception
    #[error("Statement error: {0}")]
    Statement(String),

    /// A connection-string key is missing or a setting is invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl SqlgateError {
    /// Whether the call was interrupted by a deadline or a cancellation token
    pub fn is_interrupted(&self) -> bool {
        matches!(self, SqlgateError::Timeout(_) | SqlgateError::Cancelled)
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, SqlgateError>;

//! Error types for stmtq

use thiserror::Error;

/// Core error type for stmtq operations
#[derive(Error, Debug)]
pub enum StmtqError {
    /// Caller supplied an incomplete or malformed request. Raised before any I/O.
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// A point lookup matched no row.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The caller's deadline expired; `cause` is the reason the caller attached to it.
    #[error("Timeout after {elapsed_ms}ms: {cause}")]
    Timeout { cause: String, elapsed_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl StmtqError {
    /// True for the not-found family (as opposed to malformed input or store failures)
    pub fn is_not_found(&self) -> bool {
        matches!(self, StmtqError::NotFound(_))
    }

    /// True when the error was raised by caller validation, before any query ran
    pub fn is_invalid_params(&self) -> bool {
        matches!(self, StmtqError::InvalidParams(_))
    }

    /// True when the caller's deadline expired
    pub fn is_timeout(&self) -> bool {
        matches!(self, StmtqError::Timeout { .. })
    }
}

/// Result type alias for stmtq operations
pub type Result<T> = std::result::Result<T, StmtqError>;

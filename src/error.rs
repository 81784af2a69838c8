//! Error Module
//!
//! A single error type is shared by the aggregator, the lifecycle manager and
//! the storage backends so that callers can propagate with `?` across layers.

use thiserror::Error;

/// Errors produced by the commitment and anchoring subsystem
#[derive(Debug, Error)]
pub enum AnchorError {
    /// Caller supplied something that can never succeed (not retried)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A record with the same identity already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Backend I/O or query failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Blob or record (de)serialization failure
    #[error("Codec error: {0}")]
    Codec(String),

    /// Blockchain adapter failure (submission or confirmation read)
    #[error("Blockchain error: {0}")]
    Blockchain(String),

    /// A seal record was asked to move along an edge the state machine lacks
    #[error("Illegal transition from {from} on {event}")]
    IllegalTransition { from: &'static str, event: &'static str },
}

pub type Result<T> = std::result::Result<T, AnchorError>;

impl From<sqlx::Error> for AnchorError {
    fn from(e: sqlx::Error) -> Self {
        AnchorError::Storage(e.to_string())
    }
}

impl From<std::io::Error> for AnchorError {
    fn from(e: std::io::Error) -> Self {
        AnchorError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for AnchorError {
    fn from(e: serde_json::Error) -> Self {
        AnchorError::Codec(e.to_string())
    }
}

//! Error types for Tierkeep
//!
//! This module defines the common error type shared by the reaper, the
//! collaborator stores and the column indexer.

use thiserror::Error;

/// Common result type for Tierkeep operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Tierkeep
#[derive(Debug, Error)]
pub enum Error {
    // Storage errors
    #[error("disk I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(String),

    // Metadata errors
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("{kind} lock already held: {id}")]
    Locked { kind: &'static str, id: String },

    // Index errors
    #[error("column {column} does not exist for all lines in file (line {line} has {fields} fields)")]
    ColumnOutOfRange {
        column: usize,
        fields: usize,
        line: u64,
    },

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    // Request errors
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // Internal errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NodeNotFound(_))
    }

    /// Check if the failure was caused by the caller's input rather than by
    /// the system (an API layer maps these to a 4xx response)
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_) | Self::ColumnOutOfRange { .. } | Self::NodeNotFound(_)
        )
    }
}

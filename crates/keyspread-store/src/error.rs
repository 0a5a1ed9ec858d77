//! Store error kinds.

use keyspread_core::EncodingError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a store operation.
///
/// Callers match on the variant to tell a missing row, a uniqueness
/// collision or a lost transaction race apart from a generic transport
/// failure. Nothing in this crate retries.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store call failed at the network or service layer.
    #[error("Transport error during {operation}: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    /// An entity could not be mapped to or from a row.
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Row not found: {table}/{key}")]
    NotFound { table: String, key: String },

    /// An insert collided with an existing key.
    #[error("Uniqueness violation: {table}/{key} already exists")]
    UniquenessViolation { table: String, key: String },

    #[error("Batch of {size} rows exceeds the maximum of {max}")]
    BatchTooLarge { size: usize, max: usize },

    /// The store aborted the transaction because a concurrent one touched
    /// the same rows. Nothing was written.
    #[error("Transaction conflict during {operation}: {message}")]
    Conflict {
        operation: &'static str,
        message: String,
    },
}

/// Error kind without payload, for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Encoding,
    NotFound,
    UniquenessViolation,
    BatchTooLarge,
    Conflict,
}

impl StoreError {
    pub fn transport(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Transport {
            operation,
            message: message.into(),
        }
    }

    pub fn conflict(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Conflict {
            operation,
            message: message.into(),
        }
    }

    pub fn not_found(table: &str, key: impl ToString) -> Self {
        Self::NotFound {
            table: table.to_string(),
            key: key.to_string(),
        }
    }

    pub fn uniqueness_violation(table: &str, key: impl ToString) -> Self {
        Self::UniquenessViolation {
            table: table.to_string(),
            key: key.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Transport { .. } => ErrorKind::Transport,
            StoreError::Encoding(_) => ErrorKind::Encoding,
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::UniquenessViolation { .. } => ErrorKind::UniquenessViolation,
            StoreError::BatchTooLarge { .. } => ErrorKind::BatchTooLarge,
            StoreError::Conflict { .. } => ErrorKind::Conflict,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_uniqueness_violation(&self) -> bool {
        matches!(self, StoreError::UniquenessViolation { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

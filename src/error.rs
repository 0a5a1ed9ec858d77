//! Error types of the driver.

use keyspread_generator::GeneratorError;
use keyspread_store::{ErrorKind, StoreError};
use thiserror::Error;

/// A run configuration that cannot be executed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown task '{0}'")]
    UnknownTask(String),

    #[error("Batch size must be between 1 and {max}, got {size}")]
    InvalidBatchSize { size: usize, max: usize },

    #[error(transparent)]
    Generator(#[from] GeneratorError),
}

/// Failure that ended a worker.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Worker panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Store error kind, when the failure came from the store.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            TaskError::Store(e) => Some(e.kind()),
            TaskError::Panicked(_) => None,
        }
    }
}

//! Encoding errors raised while mapping entities to and from rows.

use thiserror::Error;

/// A record could not be marshaled into (or out of) the store's row shape.
///
/// These are local bugs rather than store failures, so nothing retries them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// A column required by the entity mapping is absent from the row.
    #[error("Missing column '{column}'")]
    MissingColumn { column: String },

    /// A column holds a value of the wrong type.
    #[error("Column '{column}' expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// A field value is out of range for its entity.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl EncodingError {
    pub fn missing(column: &str) -> Self {
        Self::MissingColumn {
            column: column.to_string(),
        }
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

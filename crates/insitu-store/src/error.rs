//! Error types for the metadata store

use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the metadata store and its backends
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// A conditional insert collided with an existing item
    #[error("Item already exists in {table}: {key}")]
    Conflict { table: String, key: String },

    /// A conditional replace found no item to replace
    #[error("Item not found in {table}: {key}")]
    NotFound { table: String, key: String },

    /// Backend-level condition failure, mapped to `Conflict` or `NotFound`
    /// by the store facade
    #[error("Conditional check failed")]
    ConditionFailed,

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Invalid update expression: {0}")]
    Expression(String),

    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String, retryable: bool },
}

impl StoreError {
    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::StoreUnavailable { retryable: true, .. })
    }

    /// Whether this is a conditional write failure
    pub fn is_conditional(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict { .. } | StoreError::NotFound { .. } | StoreError::ConditionFailed
        )
    }

    pub(crate) fn unavailable(message: impl Into<String>, retryable: bool) -> Self {
        StoreError::StoreUnavailable {
            message: message.into(),
            retryable,
        }
    }
}

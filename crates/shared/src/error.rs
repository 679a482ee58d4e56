//! Error types for the Roomchat persistence layer

use thiserror::Error;

/// Errors raised by a [`ChatStore`](crate::store::ChatStore) implementation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Referenced record does not exist: {0}")]
    MissingReference(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

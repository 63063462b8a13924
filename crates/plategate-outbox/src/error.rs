//! Error types for the outbox layer.

/// Errors that can occur during outbox store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database operation failed.
    #[error("outbox database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A pooled connection could not be acquired.
    #[error("outbox connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// The referenced outbox row does not exist.
    #[error("outbox event not found: {0}")]
    NotFound(i64),
}

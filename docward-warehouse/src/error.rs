//! Error types for the warehouse.

use thiserror::Error;

/// Result type for warehouse operations.
pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// Errors that can occur in warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Storage error with context.
    #[error("storage error: {0}")]
    Storage(String),

    /// Insert-only put hit an existing key.
    #[error("entry already exists: {entity_id}/{filename}")]
    DuplicateRejected { entity_id: String, filename: String },

    /// No entry under the given key.
    #[error("entry not found: {0}")]
    NotFound(String),

    /// A stored row could not be decoded.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

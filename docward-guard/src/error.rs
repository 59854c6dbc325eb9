//! Error types for the protection loop.

use docward_warehouse::WarehouseError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for guard operations.
pub type GuardResult<T> = Result<T, GuardError>;

/// Errors surfaced by registration and the worker pool.
///
/// The protection path itself never returns these; it logs and drops.
#[derive(Debug, Error)]
pub enum GuardError {
    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Warehouse error.
    #[error("warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    /// No valid entity code could be extracted.
    #[error("no entity code found in {}", path.display())]
    Unclassified { path: PathBuf },

    /// File is bigger than the configured limit.
    #[error("{} is {size} bytes, over the {limit} byte limit", path.display())]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    /// Path has no usable file name.
    #[error("not a document path: {}", path.display())]
    InvalidPath { path: PathBuf },

    /// A blocking task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(String),
}

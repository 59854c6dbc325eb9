//! Error types for the sync engine.

use docward_warehouse::WarehouseError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport failure talking to a backend.
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with an error.
    #[error("backend error: {0}")]
    Backend(String),

    /// A backend call exceeded the call timeout.
    #[error("operation timed out")]
    Timeout,

    /// Missing credentials or settings. Aborts the whole batch.
    #[error("configuration error: {0}")]
    Config(String),

    /// Warehouse error.
    #[error("storage error: {0}")]
    Storage(#[from] WarehouseError),

    /// The scheduler is no longer running.
    #[error("channel closed")]
    ChannelClosed,
}

impl SyncError {
    /// True for failures that another attempt might fix.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Backend(_) | Self::Timeout)
    }
}

//! Core type definitions for docward.
//!
//! This crate defines the types shared by every docward component:
//! - Entity codes (validated business identifiers) and warehouse keys
//! - Warehouse entries and their sync lifecycle
//! - Audit records for protection events and sync attempts
//! - The fire-and-forget notification interface
//!
//! Storage, extraction and I/O live in their own crates.

mod entry;
mod ids;
mod notify;
mod record;

pub use entry::{ContentHash, NewEntry, SyncStatus, WarehouseEntry};
pub use ids::{EntityCode, EntryKey, MAX_CODE_DIGITS, MIN_CODE_DIGITS};
pub use notify::{LogNotifier, Notifier};
pub use record::{
    ProtectionEvent, ProtectionOutcome, SyncAttempt, SyncAttemptStatus, SyncScope,
};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid entity code {input:?}: {reason}")]
    InvalidEntityCode { input: String, reason: &'static str },

    #[error("invalid sync status: {0}")]
    InvalidSyncStatus(String),

    #[error("invalid protection outcome: {0}")]
    InvalidOutcome(String),

    #[error("invalid sync attempt status: {0}")]
    InvalidAttemptStatus(String),
}

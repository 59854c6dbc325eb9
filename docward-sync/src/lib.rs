//! Sync engine for docward.
//!
//! [`SyncEngine`] pushes `Pending` warehouse entries to every configured
//! [`RemoteBackend`], retrying each item with exponential backoff, and writes
//! one [`SyncAttempt`](docward_types::SyncAttempt) per backend to the audit
//! log. [`SyncScheduler`] runs it on a timer and on request.

mod backend;
pub mod backends;
mod engine;
mod error;
mod scheduler;

pub use backend::RemoteBackend;
pub use backends::{DirectoryBackend, GitHubBackend, GitHubConfig};
pub use engine::{RetryPolicy, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use scheduler::{SyncRequester, SyncSchedule, SyncScheduler};

//! Append-only audit records.

use crate::{EntityCode, Error};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Result of evaluating one filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionOutcome {
    Ignored,
    Restored,
    NoMatch,
}

impl ProtectionOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::Restored => "restored",
            Self::NoMatch => "no_match",
        }
    }
}

impl fmt::Display for ProtectionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtectionOutcome {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ignored" => Ok(Self::Ignored),
            "restored" => Ok(Self::Restored),
            "no_match" => Ok(Self::NoMatch),
            other => Err(Error::InvalidOutcome(other.to_string())),
        }
    }
}

/// Audit record of one evaluated filesystem change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectionEvent {
    pub id: Uuid,
    pub target_path: PathBuf,
    pub entity_id: Option<EntityCode>,
    pub outcome: ProtectionOutcome,
    /// True when an unmatched document was stored as a new canonical entry.
    pub registered: bool,
    pub elapsed: Duration,
    pub timestamp: DateTime<Utc>,
}

impl ProtectionEvent {
    #[must_use]
    pub fn new(
        target_path: impl Into<PathBuf>,
        entity_id: Option<EntityCode>,
        outcome: ProtectionOutcome,
        elapsed: Duration,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            target_path: target_path.into(),
            entity_id,
            outcome,
            registered: false,
            elapsed,
            timestamp: Utc::now(),
        }
    }
}

/// Which pending entries a sync run covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncScope {
    All,
    ByEntity(EntityCode),
}

impl SyncScope {
    /// Value stored in the audit log's `entry_ref` column.
    #[must_use]
    pub fn as_entry_ref(&self) -> String {
        match self {
            Self::All => "ALL".to_string(),
            Self::ByEntity(id) => id.to_string(),
        }
    }

    #[must_use]
    pub fn includes(&self, entity_id: &EntityCode) -> bool {
        match self {
            Self::All => true,
            Self::ByEntity(id) => id == entity_id,
        }
    }
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_entry_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAttemptStatus {
    Success,
    PartialSuccess,
    Failed,
}

impl SyncAttemptStatus {
    /// Derives the batch status from its counts.
    ///
    /// An empty batch counts as a success.
    #[must_use]
    pub fn from_counts(attempted: usize, succeeded: usize) -> Self {
        if succeeded == attempted {
            Self::Success
        } else if succeeded == 0 {
            Self::Failed
        } else {
            Self::PartialSuccess
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncAttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncAttemptStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "partial_success" => Ok(Self::PartialSuccess),
            "failed" => Ok(Self::Failed),
            other => Err(Error::InvalidAttemptStatus(other.to_string())),
        }
    }
}

/// Audit record of one batch push to one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncAttempt {
    pub id: Uuid,
    pub entry_ref: String,
    pub backend: String,
    pub status: SyncAttemptStatus,
    pub files_attempted: usize,
    pub files_succeeded: usize,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
    pub detail: Option<String>,
}

impl SyncAttempt {
    #[must_use]
    pub fn new(
        scope: &SyncScope,
        backend: impl Into<String>,
        files_attempted: usize,
        files_succeeded: usize,
        duration: Duration,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            entry_ref: scope.as_entry_ref(),
            backend: backend.into(),
            status: SyncAttemptStatus::from_counts(files_attempted, files_succeeded),
            files_attempted,
            files_succeeded,
            duration,
            timestamp: Utc::now(),
            detail: None,
        }
    }

    /// A batch that never reached the backend because it is misconfigured.
    #[must_use]
    pub fn config_failure(
        scope: &SyncScope,
        backend: impl Into<String>,
        files_attempted: usize,
        reason: impl Into<String>,
    ) -> Self {
        let mut attempt = Self::new(scope, backend, files_attempted, 0, Duration::ZERO);
        attempt.status = SyncAttemptStatus::Failed;
        attempt.detail = Some(reason.into());
        attempt
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

//! Warehouse entries: canonical documents and their sync lifecycle.

use crate::{EntityCode, EntryKey, Error};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Lowercase hex SHA-256 digest of a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    #[must_use]
    pub fn of(content: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(content)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where an entry stands with respect to the remote mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

impl SyncStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "failed" => Ok(Self::Failed),
            other => Err(Error::InvalidSyncStatus(other.to_string())),
        }
    }
}

/// Input to a warehouse `put`. Hash, timestamps and status are derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub entity_id: EntityCode,
    pub filename: String,
    pub display_label: String,
    pub content: Vec<u8>,
}

impl NewEntry {
    pub fn new(
        entity_id: EntityCode,
        filename: impl Into<String>,
        display_label: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            entity_id,
            filename: filename.into(),
            display_label: display_label.into(),
            content: content.into(),
        }
    }

    #[must_use]
    pub fn key(&self) -> EntryKey {
        EntryKey::new(self.entity_id.clone(), self.filename.clone())
    }
}

/// A canonical document held by the warehouse.
///
/// The payload and its hash are private: the hash is computed once from the
/// content when the entry is built and cannot be changed on its own. Only the
/// sync fields and `updated_at` move after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseEntry {
    pub entity_id: EntityCode,
    pub filename: String,
    pub display_label: String,
    content: Vec<u8>,
    content_hash: ContentHash,
    pub sync_status: SyncStatus,
    pub remote_locator: Option<String>,
    pub sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WarehouseEntry {
    /// Builds a fresh `Pending` entry stamped with `at`.
    #[must_use]
    pub fn create(new: NewEntry, at: DateTime<Utc>) -> Self {
        let content_hash = ContentHash::of(&new.content);
        Self {
            entity_id: new.entity_id,
            filename: new.filename,
            display_label: new.display_label,
            content: new.content,
            content_hash,
            sync_status: SyncStatus::Pending,
            remote_locator: None,
            sync_error: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    #[must_use]
    pub fn content_hash(&self) -> &ContentHash {
        &self.content_hash
    }

    #[must_use]
    pub fn key(&self) -> EntryKey {
        EntryKey::new(self.entity_id.clone(), self.filename.clone())
    }

    /// Returns true if `new` would store exactly what this entry holds.
    #[must_use]
    pub fn same_payload(&self, new: &NewEntry) -> bool {
        self.display_label == new.display_label
            && self.content_hash == ContentHash::of(&new.content)
    }
}

//! Canonical document warehouse for docward.
//!
//! [`WarehouseStore`] persists entries and audit rows in SQLite.
//! [`WarehouseMirror`] keeps an in-memory copy for lookups on the hot path.
//! [`Warehouse`] ties the two together: it fills the mirror from the store
//! when opened and routes every mutation through the store first, holding a
//! per-key lock so writers to different keys never wait on each other's
//! mirror updates.
//!
//! All operations block; async callers go through `spawn_blocking`.

mod audit;
mod error;
mod mirror;
mod store;

pub use audit::AuditLog;
pub use error::{WarehouseError, WarehouseResult};
pub use mirror::{WarehouseMirror, message_id};
pub use store::{EntitySummary, PutChange, PutMode, PutResult, WarehouseStats, WarehouseStore};

use dashmap::DashMap;
use docward_types::{
    ContentHash, EntityCode, EntryKey, NewEntry, SyncScope, SyncStatus, WarehouseEntry,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// The warehouse as the rest of the system sees it.
pub struct Warehouse {
    store: WarehouseStore,
    mirror: WarehouseMirror,
    audit: AuditLog,
    key_locks: DashMap<EntryKey, Arc<Mutex<()>>>,
}

impl Warehouse {
    /// Opens the database at `path` and loads the mirror.
    pub fn open(path: impl AsRef<Path>) -> WarehouseResult<Self> {
        Self::with_store(WarehouseStore::new(path)?)
    }

    /// In-memory warehouse (for testing).
    pub fn open_in_memory() -> WarehouseResult<Self> {
        Self::with_store(WarehouseStore::open_in_memory()?)
    }

    fn with_store(store: WarehouseStore) -> WarehouseResult<Self> {
        let warehouse = Self {
            audit: store.audit_log(),
            store,
            mirror: WarehouseMirror::new(),
            key_locks: DashMap::new(),
        };
        warehouse.reload_mirror()?;
        Ok(warehouse)
    }

    /// Rebuilds the mirror from the store.
    pub fn reload_mirror(&self) -> WarehouseResult<usize> {
        let entries = self.store.load_all()?;
        let count = entries.len();
        self.mirror.replace_all(entries);
        info!(entries = count, "warehouse mirror loaded");
        Ok(count)
    }

    #[must_use]
    pub fn mirror(&self) -> &WarehouseMirror {
        &self.mirror
    }

    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Runs `write` under the key's lock. The lock is dropped from the map
    /// once the key is gone and no other writer holds it.
    fn locked<T>(
        &self,
        key: &EntryKey,
        write: impl FnOnce() -> WarehouseResult<T>,
    ) -> WarehouseResult<T> {
        let result = {
            let lock = Arc::clone(self.key_locks.entry(key.clone()).or_default().value());
            let _guard = lock.lock().unwrap();
            write()
        };
        if self.mirror.get(key).is_none() {
            self.key_locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        }
        result
    }

    /// Per-key write locks currently kept in memory.
    #[must_use]
    pub fn key_lock_count(&self) -> usize {
        self.key_locks.len()
    }

    // ── Writes ───────────────────────────────────────────────────

    pub fn put(&self, new: NewEntry, mode: PutMode) -> WarehouseResult<PutResult> {
        let key = new.key();
        self.locked(&key, || {
            let result = self.store.put(new, mode)?;
            match result.change {
                PutChange::Unchanged => debug!(%key, "put skipped, content unchanged"),
                change => {
                    self.mirror.upsert(result.entry.clone());
                    info!(%key, ?change, hash = %result.entry.content_hash(), "stored canonical entry");
                }
            }
            Ok(result)
        })
    }

    /// See [`WarehouseStore::mark_synced`].
    pub fn mark_synced(
        &self,
        key: &EntryKey,
        uploaded: &ContentHash,
        remote_locator: &str,
    ) -> WarehouseResult<WarehouseEntry> {
        self.locked(key, || {
            let entry = self.store.mark_synced(key, uploaded, remote_locator)?;
            self.mirror.upsert(entry.clone());
            Ok(entry)
        })
    }

    pub fn mark_failed(
        &self,
        key: &EntryKey,
        attempted: &ContentHash,
        reason: &str,
    ) -> WarehouseResult<WarehouseEntry> {
        self.locked(key, || {
            let entry = self.store.mark_failed(key, attempted, reason)?;
            self.mirror.upsert(entry.clone());
            Ok(entry)
        })
    }

    /// Moves every `Failed` entry back to `Pending`. Returns how many moved.
    pub fn requeue_failed(&self) -> WarehouseResult<usize> {
        let mut moved = 0;
        for key in self.store.keys_with_status(SyncStatus::Failed)? {
            let requeued = self.locked(&key, || match self.store.requeue(&key) {
                Ok(entry) => {
                    let pending = entry.sync_status == SyncStatus::Pending;
                    self.mirror.upsert(entry);
                    Ok(pending)
                }
                Err(WarehouseError::NotFound(_)) => Ok(false),
                Err(e) => Err(e),
            })?;
            if requeued {
                moved += 1;
            }
        }
        if moved > 0 {
            info!(entries = moved, "requeued failed entries");
        }
        Ok(moved)
    }

    /// Deletes one entry. Returns false if it did not exist.
    pub fn delete(&self, key: &EntryKey) -> WarehouseResult<bool> {
        let removed = self.locked(key, || {
            let removed = self.store.delete(key)?;
            self.mirror.remove(key);
            Ok(removed)
        })?;
        if removed {
            info!(%key, "deleted warehouse entry");
        }
        Ok(removed)
    }

    /// Deletes every file of an identifier. Returns how many were removed.
    pub fn delete_entity(&self, entity_id: &EntityCode) -> WarehouseResult<usize> {
        let mut removed = 0;
        for entry in self.store.get_by_id(entity_id)? {
            if self.delete(&entry.key())? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Files registered under an identifier, served from the mirror.
    #[must_use]
    pub fn get_by_id(&self, entity_id: &EntityCode) -> Vec<Arc<WarehouseEntry>> {
        self.mirror.by_id(entity_id)
    }

    #[must_use]
    pub fn get(&self, key: &EntryKey) -> Option<Arc<WarehouseEntry>> {
        self.mirror.get(key)
    }

    /// Pending entries in scope, read from the store.
    pub fn list_pending(&self, scope: &SyncScope) -> WarehouseResult<Vec<WarehouseEntry>> {
        self.store.list_pending(scope)
    }

    /// Pending entries in scope that `ready` accepts.
    pub fn list_pending_where(
        &self,
        scope: &SyncScope,
        ready: impl Fn(&WarehouseEntry) -> bool,
    ) -> WarehouseResult<Vec<WarehouseEntry>> {
        let mut entries = self.store.list_pending(scope)?;
        entries.retain(|entry| ready(entry));
        Ok(entries)
    }

    /// Full scan of the store.
    pub fn load_all(&self) -> WarehouseResult<Vec<WarehouseEntry>> {
        self.store.load_all()
    }

    pub fn stats(&self) -> WarehouseResult<WarehouseStats> {
        self.store.stats()
    }

    pub fn summaries(&self) -> WarehouseResult<Vec<EntitySummary>> {
        self.store.summaries()
    }
}

//! In-memory read-through copy of the warehouse.
//!
//! Each identifier maps to an immutable snapshot of its files. Writers build
//! a new snapshot and swap it in, so a reader always sees either the old or
//! the new set of files for an identifier, never a half-applied change.
//! Only [`crate::Warehouse`] mutates the mirror.

use dashmap::DashMap;
use docward_types::{EntityCode, EntryKey, WarehouseEntry};
use std::collections::BTreeMap;
use std::sync::Arc;

type Files = Arc<BTreeMap<String, Arc<WarehouseEntry>>>;

#[derive(Default)]
pub struct WarehouseMirror {
    by_id: DashMap<EntityCode, Files>,
}

impl WarehouseMirror {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    // ── Reads ────────────────────────────────────────────────────

    #[must_use]
    pub fn get(&self, key: &EntryKey) -> Option<Arc<WarehouseEntry>> {
        self.by_id
            .get(&key.entity_id)
            .and_then(|files| files.get(&key.filename).cloned())
    }

    /// Every file registered under `entity_id`, ordered by file name.
    #[must_use]
    pub fn by_id(&self, entity_id: &EntityCode) -> Vec<Arc<WarehouseEntry>> {
        self.by_id
            .get(entity_id)
            .map(|files| files.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Up to `limit` entries for a structural scan: entries named
    /// `preferred_filename` first, then those sharing its message ID, then
    /// the rest, each group in key order.
    #[must_use]
    pub fn scan_candidates(
        &self,
        preferred_filename: &str,
        limit: usize,
    ) -> Vec<Arc<WarehouseEntry>> {
        let mut ids: Vec<(EntityCode, Files)> = self
            .by_id
            .iter()
            .map(|item| (item.key().clone(), Arc::clone(item.value())))
            .collect();
        ids.sort_by(|a, b| a.0.cmp(&b.0));

        let wanted_id = message_id(preferred_filename);
        let mut candidates: Vec<Arc<WarehouseEntry>> = ids
            .iter()
            .flat_map(|(_, files)| files.values().cloned())
            .collect();
        candidates.sort_by_key(|entry| {
            if entry.filename == preferred_filename {
                0
            } else if wanted_id.is_some() && message_id(&entry.filename) == wanted_id {
                1
            } else {
                2
            }
        });
        candidates.truncate(limit);
        candidates
    }

    /// Number of files held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.iter().map(|item| item.value().len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    // ── Writes (warehouse only) ──────────────────────────────────

    pub(crate) fn replace_all(&self, entries: Vec<WarehouseEntry>) {
        let mut grouped: BTreeMap<EntityCode, BTreeMap<String, Arc<WarehouseEntry>>> =
            BTreeMap::new();
        for entry in entries {
            grouped
                .entry(entry.entity_id.clone())
                .or_default()
                .insert(entry.filename.clone(), Arc::new(entry));
        }
        self.by_id.clear();
        for (id, files) in grouped {
            self.by_id.insert(id, Arc::new(files));
        }
    }

    pub(crate) fn upsert(&self, entry: WarehouseEntry) {
        let filename = entry.filename.clone();
        let entry = Arc::new(entry);
        self.by_id
            .entry(entry.entity_id.clone())
            .and_modify(|files| {
                let mut next = (**files).clone();
                next.insert(filename.clone(), Arc::clone(&entry));
                *files = Arc::new(next);
            })
            .or_insert_with(|| {
                Arc::new(BTreeMap::from([(filename.clone(), Arc::clone(&entry))]))
            });
    }

    pub(crate) fn remove(&self, key: &EntryKey) {
        let now_empty = match self.by_id.get_mut(&key.entity_id) {
            Some(mut files) => {
                if files.contains_key(&key.filename) {
                    let mut next = (**files).clone();
                    next.remove(&key.filename);
                    *files = Arc::new(next);
                }
                files.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.by_id.remove_if(&key.entity_id, |_, files| files.is_empty());
        }
    }
}

/// The message ID a declaration file name ends with: the part after the last
/// `_`, up to the first `.`. `None` when the name has no `_`.
#[must_use]
pub fn message_id(filename: &str) -> Option<&str> {
    let (_, tail) = filename.rsplit_once('_')?;
    let id = tail.split('.').next().unwrap_or(tail);
    (!id.is_empty()).then_some(id)
}

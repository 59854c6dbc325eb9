//! Durable storage of canonical documents.
//!
//! One SQLite file holds the warehouse table and the two audit tables. The
//! connection is shared with [`AuditLog`] so both see the same database.

use crate::audit::AuditLog;
use crate::error::{WarehouseError, WarehouseResult};
use chrono::{DateTime, SubsecRound, Utc};
use docward_types::{
    ContentHash, EntityCode, EntryKey, NewEntry, SyncScope, SyncStatus, WarehouseEntry,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

const ENTRY_COLUMNS: &str = "entity_id, filename, display_label, content, content_hash, \
     sync_status, remote_locator, sync_error, created_at, updated_at";

/// How `put` treats an existing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    /// Replace the stored entry.
    Upsert,
    /// Fail with `DuplicateRejected` if the key exists.
    InsertOnly,
}

/// What a `put` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutChange {
    Inserted,
    Replaced,
    /// Same content and label were already stored.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    pub entry: WarehouseEntry,
    pub change: PutChange,
}

/// Counts over the whole warehouse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarehouseStats {
    pub entities: usize,
    pub files: usize,
    pub pending: usize,
    pub synced: usize,
    pub failed: usize,
}

/// One line of the per-identifier listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySummary {
    pub entity_id: EntityCode,
    pub display_label: String,
    pub files: usize,
    pub last_updated: DateTime<Utc>,
}

/// Persistent warehouse backed by SQLite.
pub struct WarehouseStore {
    conn: Arc<Mutex<Connection>>,
}

impl WarehouseStore {
    /// Opens (or creates) a warehouse database at the given path.
    pub fn new(path: impl AsRef<Path>) -> WarehouseResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| WarehouseError::Storage(format!("failed to open warehouse: {e}")))?;
        let mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| WarehouseError::Storage(format!("failed to enable WAL: {e}")))?;
        debug!(path = %path.display(), journal_mode = %mode, "opened warehouse");
        Self::with_connection(conn)
    }

    /// Opens an in-memory warehouse (for testing).
    pub fn open_in_memory() -> WarehouseResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            WarehouseError::Storage(format!("failed to open in-memory warehouse: {e}"))
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> WarehouseResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> WarehouseResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS warehouse_entries (
                entity_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                display_label TEXT NOT NULL,
                content BLOB NOT NULL,
                content_hash TEXT NOT NULL,
                sync_status TEXT NOT NULL DEFAULT 'pending',
                remote_locator TEXT,
                sync_error TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (entity_id, filename)
            );

            CREATE INDEX IF NOT EXISTS idx_entries_hash ON warehouse_entries(content_hash);
            CREATE INDEX IF NOT EXISTS idx_entries_status ON warehouse_entries(sync_status);

            CREATE TABLE IF NOT EXISTS protection_events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                target_path TEXT NOT NULL,
                entity_id TEXT,
                outcome TEXT NOT NULL,
                registered INTEGER NOT NULL DEFAULT 0,
                elapsed_us INTEGER NOT NULL,
                timestamp INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sync_attempts (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                entry_ref TEXT NOT NULL,
                backend TEXT NOT NULL,
                status TEXT NOT NULL,
                files_attempted INTEGER NOT NULL,
                files_succeeded INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                detail TEXT
            );
            ",
        )
        .map_err(|e| WarehouseError::Storage(format!("failed to init warehouse schema: {e}")))?;
        Ok(())
    }

    /// Audit log sharing this store's database.
    #[must_use]
    pub fn audit_log(&self) -> AuditLog {
        AuditLog::new(Arc::clone(&self.conn))
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Stores a canonical document.
    ///
    /// A replaced entry keeps its `created_at` and goes back to `Pending`.
    /// Putting the same content and label again changes nothing.
    pub fn put(&self, new: NewEntry, mode: PutMode) -> WarehouseResult<PutResult> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let (entry, change) = match select_entry(&tx, &new.entity_id, &new.filename)? {
            Some(_) if mode == PutMode::InsertOnly => {
                return Err(WarehouseError::DuplicateRejected {
                    entity_id: new.entity_id.to_string(),
                    filename: new.filename,
                });
            }
            Some(current) if current.same_payload(&new) => {
                return Ok(PutResult {
                    entry: current,
                    change: PutChange::Unchanged,
                });
            }
            Some(current) => {
                let mut entry = WarehouseEntry::create(new, current.created_at);
                entry.updated_at = now();
                (entry, PutChange::Replaced)
            }
            None => (WarehouseEntry::create(new, now()), PutChange::Inserted),
        };

        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO warehouse_entries ({ENTRY_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                entry.entity_id.as_str(),
                entry.filename,
                entry.display_label,
                entry.content(),
                entry.content_hash().as_str(),
                entry.sync_status.as_str(),
                entry.remote_locator,
                entry.sync_error,
                entry.created_at.timestamp_millis(),
                entry.updated_at.timestamp_millis(),
            ],
        )?;
        tx.commit()?;
        Ok(PutResult { entry, change })
    }

    /// Marks an entry as pushed. Repeating the call changes nothing.
    ///
    /// `uploaded` is the hash of the content that was sent. If the stored
    /// content has changed since, the entry is returned untouched and stays
    /// `Pending` for the next run.
    pub fn mark_synced(
        &self,
        key: &EntryKey,
        uploaded: &ContentHash,
        remote_locator: &str,
    ) -> WarehouseResult<WarehouseEntry> {
        self.transition(key, Some(uploaded), |entry| {
            entry.sync_status = SyncStatus::Synced;
            entry.remote_locator = Some(remote_locator.to_string());
            entry.sync_error = None;
        })
    }

    /// Marks an entry as failed with the reason. Like `mark_synced`, does
    /// nothing if the stored content is no longer the `attempted` one.
    pub fn mark_failed(
        &self,
        key: &EntryKey,
        attempted: &ContentHash,
        reason: &str,
    ) -> WarehouseResult<WarehouseEntry> {
        self.transition(key, Some(attempted), |entry| {
            entry.sync_status = SyncStatus::Failed;
            entry.sync_error = Some(reason.to_string());
        })
    }

    /// Moves a `Failed` entry back to `Pending`. Other states are left alone.
    pub fn requeue(&self, key: &EntryKey) -> WarehouseResult<WarehouseEntry> {
        self.transition(key, None, |entry| {
            if entry.sync_status == SyncStatus::Failed {
                entry.sync_status = SyncStatus::Pending;
                entry.sync_error = None;
            }
        })
    }

    fn transition(
        &self,
        key: &EntryKey,
        expected: Option<&ContentHash>,
        apply: impl FnOnce(&mut WarehouseEntry),
    ) -> WarehouseResult<WarehouseEntry> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let mut entry = select_entry(&tx, &key.entity_id, &key.filename)?
            .ok_or_else(|| WarehouseError::NotFound(key.to_string()))?;
        if let Some(expected) = expected {
            if entry.content_hash() != expected {
                debug!(%key, "content replaced since it was read, status left as is");
                return Ok(entry);
            }
        }
        let before = (
            entry.sync_status,
            entry.remote_locator.clone(),
            entry.sync_error.clone(),
        );
        apply(&mut entry);
        if entry.sync_status == before.0
            && entry.remote_locator == before.1
            && entry.sync_error == before.2
        {
            return Ok(entry);
        }

        entry.updated_at = now();
        tx.execute(
            "UPDATE warehouse_entries
             SET sync_status = ?3, remote_locator = ?4, sync_error = ?5, updated_at = ?6
             WHERE entity_id = ?1 AND filename = ?2",
            params![
                key.entity_id.as_str(),
                key.filename,
                entry.sync_status.as_str(),
                entry.remote_locator,
                entry.sync_error,
                entry.updated_at.timestamp_millis(),
            ],
        )?;
        tx.commit()?;
        Ok(entry)
    }

    /// Deletes one entry. Returns false if it did not exist.
    pub fn delete(&self, key: &EntryKey) -> WarehouseResult<bool> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM warehouse_entries WHERE entity_id = ?1 AND filename = ?2",
            params![key.entity_id.as_str(), key.filename],
        )?;
        Ok(removed > 0)
    }

    // ── Reads ────────────────────────────────────────────────────

    pub fn get(&self, key: &EntryKey) -> WarehouseResult<Option<WarehouseEntry>> {
        let conn = self.conn.lock().unwrap();
        select_entry(&conn, &key.entity_id, &key.filename)
    }

    /// All documents registered under an identifier, by file name.
    pub fn get_by_id(&self, entity_id: &EntityCode) -> WarehouseResult<Vec<WarehouseEntry>> {
        let conn = self.conn.lock().unwrap();
        query_entries(
            &conn,
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM warehouse_entries \
                 WHERE entity_id = ?1 ORDER BY filename"
            ),
            params![entity_id.as_str()],
        )
    }

    /// Pending entries in scope, ordered by key.
    pub fn list_pending(&self, scope: &SyncScope) -> WarehouseResult<Vec<WarehouseEntry>> {
        let conn = self.conn.lock().unwrap();
        match scope {
            SyncScope::All => query_entries(
                &conn,
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM warehouse_entries \
                     WHERE sync_status = 'pending' ORDER BY entity_id, filename"
                ),
                [],
            ),
            SyncScope::ByEntity(id) => query_entries(
                &conn,
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM warehouse_entries \
                     WHERE sync_status = 'pending' AND entity_id = ?1 ORDER BY filename"
                ),
                params![id.as_str()],
            ),
        }
    }

    /// Keys of every entry in `status`.
    pub fn keys_with_status(&self, status: SyncStatus) -> WarehouseResult<Vec<EntryKey>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT entity_id, filename FROM warehouse_entries
             WHERE sync_status = ?1 ORDER BY entity_id, filename",
        )?;
        let rows = stmt.query_map(params![status.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut keys = Vec::new();
        for row in rows {
            let (entity_id, filename) = row?;
            keys.push(EntryKey::new(parse_code(&entity_id)?, filename));
        }
        Ok(keys)
    }

    /// Full scan, ordered by key.
    pub fn load_all(&self) -> WarehouseResult<Vec<WarehouseEntry>> {
        let conn = self.conn.lock().unwrap();
        query_entries(
            &conn,
            &format!("SELECT {ENTRY_COLUMNS} FROM warehouse_entries ORDER BY entity_id, filename"),
            [],
        )
    }

    pub fn stats(&self) -> WarehouseResult<WarehouseStats> {
        let conn = self.conn.lock().unwrap();
        let (entities, files, pending, synced, failed): (i64, i64, i64, i64, i64) = conn
            .query_row(
                "SELECT COUNT(DISTINCT entity_id), COUNT(*),
                        COALESCE(SUM(sync_status = 'pending'), 0),
                        COALESCE(SUM(sync_status = 'synced'), 0),
                        COALESCE(SUM(sync_status = 'failed'), 0)
                 FROM warehouse_entries",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .map_err(|e| WarehouseError::Storage(format!("failed to compute stats: {e}")))?;

        Ok(WarehouseStats {
            entities: entities as usize,
            files: files as usize,
            pending: pending as usize,
            synced: synced as usize,
            failed: failed as usize,
        })
    }

    /// Per identifier: label of the most recently updated file, file count
    /// and last update.
    pub fn summaries(&self) -> WarehouseResult<Vec<EntitySummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT entity_id, display_label, COUNT(*), MAX(updated_at)
             FROM warehouse_entries GROUP BY entity_id ORDER BY entity_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (entity_id, display_label, files, last_updated) = row?;
            summaries.push(EntitySummary {
                entity_id: parse_code(&entity_id)?,
                display_label,
                files: files as usize,
                last_updated: from_millis(last_updated)?,
            });
        }
        Ok(summaries)
    }
}

// ── Row helpers ──────────────────────────────────────────────────

struct RawEntry {
    entity_id: String,
    filename: String,
    display_label: String,
    content: Vec<u8>,
    content_hash: String,
    sync_status: String,
    remote_locator: Option<String>,
    sync_error: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl RawEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            entity_id: row.get(0)?,
            filename: row.get(1)?,
            display_label: row.get(2)?,
            content: row.get(3)?,
            content_hash: row.get(4)?,
            sync_status: row.get(5)?,
            remote_locator: row.get(6)?,
            sync_error: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_entry(self) -> WarehouseResult<WarehouseEntry> {
        let entity_id = parse_code(&self.entity_id)?;
        let sync_status = self
            .sync_status
            .parse()
            .map_err(|e| WarehouseError::InvalidData(format!("{e}")))?;

        let mut entry = WarehouseEntry::create(
            NewEntry::new(entity_id, self.filename, self.display_label, self.content),
            from_millis(self.created_at)?,
        );
        if entry.content_hash().as_str() != self.content_hash {
            warn!(
                key = %entry.key(),
                stored = %self.content_hash,
                "stored content hash does not match content, using recomputed hash"
            );
        }
        entry.sync_status = sync_status;
        entry.remote_locator = self.remote_locator;
        entry.sync_error = self.sync_error;
        entry.updated_at = from_millis(self.updated_at)?;
        Ok(entry)
    }
}

fn select_entry(
    conn: &Connection,
    entity_id: &EntityCode,
    filename: &str,
) -> WarehouseResult<Option<WarehouseEntry>> {
    conn.query_row(
        &format!(
            "SELECT {ENTRY_COLUMNS} FROM warehouse_entries WHERE entity_id = ?1 AND filename = ?2"
        ),
        params![entity_id.as_str(), filename],
        RawEntry::from_row,
    )
    .optional()?
    .map(RawEntry::into_entry)
    .transpose()
}

fn query_entries<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> WarehouseResult<Vec<WarehouseEntry>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, RawEntry::from_row)?;
    rows.map(|row| row.map_err(WarehouseError::from).and_then(RawEntry::into_entry))
        .collect()
}

pub(crate) fn parse_code(raw: &str) -> WarehouseResult<EntityCode> {
    EntityCode::parse(raw)
        .map_err(|e| WarehouseError::InvalidData(format!("invalid entity_id {raw:?}: {e}")))
}

pub(crate) fn from_millis(ms: i64) -> WarehouseResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| WarehouseError::InvalidData(format!("timestamp out of range: {ms}")))
}

/// Current time at the precision the database keeps.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

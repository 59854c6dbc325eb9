//! Append-only audit tables for protection events and sync attempts.

use crate::error::{WarehouseError, WarehouseResult};
use crate::store::{from_millis, parse_code};
use docward_types::{ProtectionEvent, SyncAttempt};
use rusqlite::{params, Connection};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Writer and reader for the audit tables. Cheap to clone.
#[derive(Clone)]
pub struct AuditLog {
    conn: Arc<Mutex<Connection>>,
}

impl AuditLog {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    // ── Protection events ────────────────────────────────────────

    pub fn record_protection(&self, event: &ProtectionEvent) -> WarehouseResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO protection_events
                (id, target_path, entity_id, outcome, registered, elapsed_us, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.id.to_string(),
                event.target_path.to_string_lossy().into_owned(),
                event.entity_id.as_ref().map(|id| id.to_string()),
                event.outcome.as_str(),
                event.registered,
                i64::try_from(event.elapsed.as_micros()).unwrap_or(i64::MAX),
                event.timestamp.timestamp_millis(),
            ],
        )
        .map_err(|e| WarehouseError::Storage(format!("failed to save protection event: {e}")))?;
        Ok(())
    }

    /// Most recent protection events first.
    pub fn recent_protection_events(
        &self,
        limit: usize,
        offset: usize,
    ) -> WarehouseResult<Vec<ProtectionEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, target_path, entity_id, outcome, registered, elapsed_us, timestamp
             FROM protection_events ORDER BY seq DESC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, bool>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, target_path, entity_id, outcome, registered, elapsed_us, timestamp) = row?;
            events.push(ProtectionEvent {
                id: parse_uuid(&id)?,
                target_path: PathBuf::from(target_path),
                entity_id: entity_id.as_deref().map(parse_code).transpose()?,
                outcome: outcome
                    .parse()
                    .map_err(|e| WarehouseError::InvalidData(format!("{e}")))?,
                registered,
                elapsed: Duration::from_micros(elapsed_us.max(0) as u64),
                timestamp: from_millis(timestamp)?,
            });
        }
        Ok(events)
    }

    pub fn protection_event_count(&self) -> WarehouseResult<usize> {
        self.count("SELECT COUNT(*) FROM protection_events")
    }

    // ── Sync attempts ────────────────────────────────────────────

    pub fn record_sync_attempt(&self, attempt: &SyncAttempt) -> WarehouseResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sync_attempts
                (id, entry_ref, backend, status, files_attempted, files_succeeded,
                 duration_ms, timestamp, detail)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                attempt.id.to_string(),
                attempt.entry_ref,
                attempt.backend,
                attempt.status.as_str(),
                attempt.files_attempted as i64,
                attempt.files_succeeded as i64,
                i64::try_from(attempt.duration.as_millis()).unwrap_or(i64::MAX),
                attempt.timestamp.timestamp_millis(),
                attempt.detail,
            ],
        )
        .map_err(|e| WarehouseError::Storage(format!("failed to save sync attempt: {e}")))?;
        Ok(())
    }

    /// Most recent sync attempts first.
    pub fn recent_sync_attempts(
        &self,
        limit: usize,
        offset: usize,
    ) -> WarehouseResult<Vec<SyncAttempt>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, entry_ref, backend, status, files_attempted, files_succeeded,
                    duration_ms, timestamp, detail
             FROM sync_attempts ORDER BY seq DESC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], |row| {
            Ok(RawAttempt {
                id: row.get(0)?,
                entry_ref: row.get(1)?,
                backend: row.get(2)?,
                status: row.get(3)?,
                files_attempted: row.get(4)?,
                files_succeeded: row.get(5)?,
                duration_ms: row.get(6)?,
                timestamp: row.get(7)?,
                detail: row.get(8)?,
            })
        })?;

        let mut attempts = Vec::new();
        for row in rows {
            let raw = row?;
            attempts.push(SyncAttempt {
                id: parse_uuid(&raw.id)?,
                entry_ref: raw.entry_ref,
                backend: raw.backend,
                status: raw
                    .status
                    .parse()
                    .map_err(|e| WarehouseError::InvalidData(format!("{e}")))?,
                files_attempted: raw.files_attempted.max(0) as usize,
                files_succeeded: raw.files_succeeded.max(0) as usize,
                duration: Duration::from_millis(raw.duration_ms.max(0) as u64),
                timestamp: from_millis(raw.timestamp)?,
                detail: raw.detail,
            });
        }
        Ok(attempts)
    }

    pub fn sync_attempt_count(&self) -> WarehouseResult<usize> {
        self.count("SELECT COUNT(*) FROM sync_attempts")
    }

    fn count(&self, sql: &str) -> WarehouseResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(sql, [], |row| row.get(0))
            .map_err(|e| WarehouseError::Storage(format!("failed to count audit rows: {e}")))?;
        Ok(count as usize)
    }
}

struct RawAttempt {
    id: String,
    entry_ref: String,
    backend: String,
    status: String,
    files_attempted: i64,
    files_succeeded: i64,
    duration_ms: i64,
    timestamp: i64,
    detail: Option<String>,
}

fn parse_uuid(raw: &str) -> WarehouseResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| WarehouseError::InvalidData(format!("invalid audit id: {e}")))
}

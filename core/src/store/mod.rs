//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The portal calls store methods; it never executes SQL directly.

use crate::{
    error::PortalResult,
    event::EventLogEntry,
    types::Timestamp,
};
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;

mod matrix;
mod registry;
mod requests;

pub struct PortalStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl PortalStore {
    pub fn open(path: &str) -> PortalResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> PortalResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new in-memory database (isolated).
    pub fn reopen(&self) -> PortalResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order. Safe to run repeatedly.
    pub fn migrate(&self) -> PortalResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_registry.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_requests.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/004_assignment_matrix.sql"))?;
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> PortalResult<i64> {
        self.conn.execute(
            "INSERT INTO event_log (event_type, document_id, payload, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.event_type,
                entry.document_id,
                entry.payload,
                ts_to_sql(&entry.recorded_at),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn events_for_document(&self, document_id: &str) -> PortalResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, event_type, document_id, payload, recorded_at
             FROM event_log WHERE document_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![document_id], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    event_type: row.get(1)?,
                    document_id: row.get(2)?,
                    payload: row.get(3)?,
                    recorded_at: ts_from_sql(4, row.get(4)?)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self) -> PortalResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM event_log", [], |r| r.get(0))?)
    }
}

// ── Column helpers ─────────────────────────────────────────────────────────

/// Timestamps are stored as unix milliseconds.
fn ts_to_sql(ts: &Timestamp) -> i64 {
    ts.timestamp_millis()
}

fn ts_from_sql(idx: usize, millis: i64) -> rusqlite::Result<Timestamp> {
    chrono::DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

fn opt_ts_from_sql(idx: usize, millis: Option<i64>) -> rusqlite::Result<Option<Timestamp>> {
    millis.map(|m| ts_from_sql(idx, m)).transpose()
}

fn json_from_sql<T: DeserializeOwned>(idx: usize, text: &str) -> rusqlite::Result<T> {
    serde_json::from_str(text).map_err(|e| conversion_error(idx, e))
}

fn conversion_error(
    idx: usize,
    e: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
}

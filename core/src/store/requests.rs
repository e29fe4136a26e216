//! Request queries.

use super::{conversion_error, json_from_sql, opt_ts_from_sql, ts_from_sql, ts_to_sql, PortalStore};
use crate::{
    error::{PortalError, PortalResult},
    request::{Request, RequestKind},
    status::{RequestStatus, StatusPatch, TransitionKind},
    visibility::AccessScope,
};
use rusqlite::params;

const REQUEST_COLUMNS: &str = "id, kind, submitted_by, department, protocols, pic, status,
    client, address, agenda, notes, file_url, confirmation_notes, confirmed_by,
    confirmed_at, completed_by, completed_at, created_at, updated_at,
    last_modified_by, revision";

// Helper function for mapping request rows
fn request_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<Request> {
    let kind: String = row.get(1)?;
    let status: String = row.get(6)?;
    let protocols: String = row.get(4)?;
    let pic: String = row.get(5)?;
    Ok(Request {
        id: row.get(0)?,
        kind: RequestKind::parse(&kind)
            .ok_or_else(|| conversion_error(1, format!("unknown request kind '{kind}'")))?,
        submitted_by: row.get(2)?,
        department: row.get(3)?,
        protocols: json_from_sql(4, &protocols)?,
        pic: json_from_sql(5, &pic)?,
        status: RequestStatus::parse(&status).map_err(|e| conversion_error(6, e))?,
        client: row.get(7)?,
        address: row.get(8)?,
        agenda: row.get(9)?,
        notes: row.get(10)?,
        file_url: row.get(11)?,
        confirmation_notes: row.get(12)?,
        confirmed_by: row.get(13)?,
        confirmed_at: opt_ts_from_sql(14, row.get(14)?)?,
        completed_by: row.get(15)?,
        completed_at: opt_ts_from_sql(16, row.get(16)?)?,
        created_at: ts_from_sql(17, row.get(17)?)?,
        updated_at: ts_from_sql(18, row.get(18)?)?,
        last_modified_by: row.get(19)?,
        revision: row.get::<_, i64>(20)? as u64,
    })
}

impl PortalStore {
    // ── Requests ─────────────────────────────────────────────────────

    pub fn insert_request(&self, r: &Request) -> PortalResult<()> {
        self.conn.execute(
            "INSERT INTO service_request (
                id, kind, submitted_by, department, protocols, pic, status,
                client, address, agenda, notes, file_url, confirmation_notes, confirmed_by,
                confirmed_at, completed_by, completed_at, created_at, updated_at,
                last_modified_by, revision
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                       ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
            params![
                &r.id,
                r.kind.as_str(),
                &r.submitted_by,
                &r.department,
                serde_json::to_string(&r.protocols)?,
                serde_json::to_string(&r.pic)?,
                r.status.as_str(),
                &r.client,
                &r.address,
                &r.agenda,
                &r.notes,
                r.file_url.as_deref(),
                r.confirmation_notes.as_deref(),
                r.confirmed_by.as_deref(),
                r.confirmed_at.as_ref().map(ts_to_sql),
                r.completed_by.as_deref(),
                r.completed_at.as_ref().map(ts_to_sql),
                ts_to_sql(&r.created_at),
                ts_to_sql(&r.updated_at),
                &r.last_modified_by,
                r.revision as i64,
            ],
        )?;
        Ok(())
    }

    pub fn get_request(&self, request_id: &str) -> PortalResult<Request> {
        self.conn
            .query_row(
                &format!("SELECT {REQUEST_COLUMNS} FROM service_request WHERE id = ?1"),
                params![request_id],
                request_row_mapper,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => PortalError::not_found("request", request_id),
                other => other.into(),
            })
    }

    /// Newest first. `OwnSubmissions` is pushed down as a
    /// `submitted_by = ?` predicate; `Global` applies none.
    pub fn list_requests(&self, scope: &AccessScope) -> PortalResult<Vec<Request>> {
        let rows = match scope {
            AccessScope::Global => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {REQUEST_COLUMNS} FROM service_request
                     ORDER BY created_at DESC, id ASC"
                ))?;
                let rows = stmt.query_map([], request_row_mapper)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            AccessScope::OwnSubmissions(user_id) => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {REQUEST_COLUMNS} FROM service_request
                     WHERE submitted_by = ?1
                     ORDER BY created_at DESC, id ASC"
                ))?;
                let rows = stmt.query_map(params![user_id], request_row_mapper)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(rows)
    }

    /// Merge a transition patch into the stored request. Only the stamped
    /// columns are written, and only while the stored status still equals
    /// `patch.from`. Returns the request as stored afterwards.
    pub fn apply_status_patch(&self, request_id: &str, patch: &StatusPatch) -> PortalResult<Request> {
        let changed = self.conn.execute(
            "UPDATE service_request SET
                status             = ?1,
                confirmation_notes = COALESCE(?2, confirmation_notes),
                confirmed_by       = COALESCE(?3, confirmed_by),
                confirmed_at       = COALESCE(?4, confirmed_at),
                completed_by       = COALESCE(?5, completed_by),
                completed_at       = COALESCE(?6, completed_at),
                updated_at         = ?7,
                last_modified_by   = ?8,
                revision           = revision + 1
             WHERE id = ?9 AND status = ?10",
            params![
                patch.to.as_str(),
                patch.confirmation_notes.as_deref(),
                patch.confirmed_by.as_deref(),
                patch.confirmed_at.as_ref().map(ts_to_sql),
                patch.completed_by.as_deref(),
                patch.completed_at.as_ref().map(ts_to_sql),
                ts_to_sql(&patch.updated_at),
                &patch.last_modified_by,
                request_id,
                patch.from.as_str(),
            ],
        )?;

        if changed == 0 {
            let current = self.get_request(request_id)?;
            let action = match patch.to {
                RequestStatus::Completed => TransitionKind::Complete.action(),
                _ => TransitionKind::Confirm.action(),
            };
            return Err(PortalError::TransitionRefused {
                from: current.status,
                action,
                reason: format!("expected a {} request when writing", patch.from),
            });
        }
        self.get_request(request_id)
    }

    // ── Counts ───────────────────────────────────────────────────────

    pub fn request_count(&self) -> PortalResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM service_request", [], |r| r.get(0))?)
    }

    pub fn request_count_by_status(&self, status: RequestStatus) -> PortalResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM service_request WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?)
    }
}

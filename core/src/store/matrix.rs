//! Assignment matrix queries.

use super::{json_from_sql, opt_ts_from_sql, ts_to_sql, PortalStore};
use crate::{
    error::{PortalError, PortalResult},
    matrix::AssignmentEntry,
    types::{EngineerName, Timestamp},
};
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeSet;

fn assignment_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<AssignmentEntry> {
    let pics: String = row.get(2)?;
    Ok(AssignmentEntry {
        manager_id: row.get(0)?,
        manager_name: row.get(1)?,
        assigned_pics: json_from_sql(2, &pics)?,
        version: row.get::<_, i64>(3)? as u64,
        updated_at: opt_ts_from_sql(4, row.get(4)?)?,
    })
}

impl PortalStore {
    // ── Assignment matrix ──────────────────────────────────────────

    pub fn get_assignment(&self, manager_id: &str) -> PortalResult<Option<AssignmentEntry>> {
        Ok(self
            .conn
            .query_row(
                "SELECT manager_id, manager_name, assigned_pics, version, updated_at
                 FROM assignment_matrix WHERE manager_id = ?1",
                params![manager_id],
                assignment_row_mapper,
            )
            .optional()?)
    }

    pub fn list_assignments(&self) -> PortalResult<Vec<AssignmentEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT manager_id, manager_name, assigned_pics, version, updated_at
             FROM assignment_matrix ORDER BY manager_id",
        )?;
        let rows = stmt.query_map([], assignment_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Check-and-set write of a manager's complete engineer set.
    ///
    /// Succeeds only if the stored version (0 for a missing row) equals
    /// `expected_version`; the stored version then becomes
    /// `expected_version + 1`. The row is created on first write.
    pub fn write_assignment(
        &self,
        manager_id: &str,
        manager_name: &str,
        assigned_pics: &BTreeSet<EngineerName>,
        expected_version: u64,
        now: Timestamp,
    ) -> PortalResult<AssignmentEntry> {
        let tx = self.conn.unchecked_transaction()?;
        let actual = tx
            .query_row(
                "SELECT version FROM assignment_matrix WHERE manager_id = ?1",
                params![manager_id],
                |r| r.get::<_, i64>(0),
            )
            .optional()?
            .map(|v| v as u64)
            .unwrap_or(0);

        if actual != expected_version {
            return Err(PortalError::VersionConflict {
                manager_id: manager_id.to_string(),
                expected: expected_version,
                actual,
            });
        }

        let version = actual + 1;
        tx.execute(
            "INSERT INTO assignment_matrix (manager_id, manager_name, assigned_pics, version, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (manager_id) DO UPDATE SET
                manager_name  = excluded.manager_name,
                assigned_pics = excluded.assigned_pics,
                version       = excluded.version,
                updated_at    = excluded.updated_at",
            params![
                manager_id,
                manager_name,
                serde_json::to_string(assigned_pics)?,
                version as i64,
                ts_to_sql(&now),
            ],
        )?;
        tx.commit()?;

        Ok(AssignmentEntry {
            manager_id: manager_id.to_string(),
            manager_name: manager_name.to_string(),
            assigned_pics: assigned_pics.clone(),
            version,
            updated_at: Some(now),
        })
    }
}

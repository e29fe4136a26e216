//! Booking rule and protocol queries.

use super::{conversion_error, json_from_sql, ts_from_sql, ts_to_sql, PortalStore};
use crate::{
    error::{PortalError, PortalResult},
    pic::PicAssignment,
    registry::{BookingRule, Protocol, RuleType},
};
use rusqlite::{params, OptionalExtension};

fn booking_rule_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<BookingRule> {
    let rule_type: String = row.get(1)?;
    Ok(BookingRule {
        id: row.get(0)?,
        rule_type: RuleType::parse(&rule_type)
            .ok_or_else(|| conversion_error(1, format!("unknown rule type '{rule_type}'")))?,
        condition: row.get(2)?,
        assigned_pic: row.get(3)?,
        priority: row.get(4)?,
        created_at: ts_from_sql(5, row.get(5)?)?,
    })
}

fn protocol_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<Protocol> {
    let pic: String = row.get(3)?;
    Ok(Protocol {
        id: row.get(0)?,
        uid: row.get(1)?,
        label: row.get(2)?,
        pic: json_from_sql(3, &pic)?,
        is_active: row.get::<_, i32>(4)? != 0,
    })
}

impl PortalStore {
    // ── Booking rules ──────────────────────────────────────────────

    pub fn insert_booking_rule(&self, rule: &BookingRule) -> PortalResult<()> {
        self.conn.execute(
            "INSERT INTO booking_rule (id, rule_type, condition, assigned_pic, priority, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &rule.id,
                rule.rule_type.as_str(),
                &rule.condition,
                &rule.assigned_pic,
                rule.priority,
                ts_to_sql(&rule.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_booking_rule(&self, rule_id: &str) -> PortalResult<BookingRule> {
        self.conn
            .query_row(
                "SELECT id, rule_type, condition, assigned_pic, priority, created_at
                 FROM booking_rule WHERE id = ?1",
                params![rule_id],
                booking_rule_row_mapper,
            )
            .optional()?
            .ok_or_else(|| PortalError::not_found("booking rule", rule_id))
    }

    /// Evaluation order: priority, then creation time, then id.
    pub fn list_booking_rules(&self) -> PortalResult<Vec<BookingRule>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, rule_type, condition, assigned_pic, priority, created_at
             FROM booking_rule
             ORDER BY priority ASC, created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map([], booking_rule_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn update_booking_rule(&self, rule: &BookingRule) -> PortalResult<()> {
        let changed = self.conn.execute(
            "UPDATE booking_rule SET rule_type = ?1, condition = ?2, assigned_pic = ?3, priority = ?4
             WHERE id = ?5",
            params![
                rule.rule_type.as_str(),
                &rule.condition,
                &rule.assigned_pic,
                rule.priority,
                &rule.id,
            ],
        )?;
        if changed == 0 {
            return Err(PortalError::not_found("booking rule", &rule.id));
        }
        Ok(())
    }

    /// Returns false if there was no such rule.
    pub fn delete_booking_rule(&self, rule_id: &str) -> PortalResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM booking_rule WHERE id = ?1", params![rule_id])?;
        Ok(changed > 0)
    }

    // ── Protocols ──────────────────────────────────────────────────

    pub fn insert_protocol(&self, p: &Protocol) -> PortalResult<()> {
        self.conn.execute(
            "INSERT INTO protocol (id, uid, label, pic, is_active) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &p.id,
                &p.uid,
                &p.label,
                serde_json::to_string(&p.pic)?,
                if p.is_active { 1i32 } else { 0i32 },
            ],
        )?;
        Ok(())
    }

    /// Protocol ids are matched trimmed and case-insensitively by every
    /// lookup below, like selections.
    pub fn protocol_exists(&self, protocol_id: &str) -> PortalResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM protocol WHERE UPPER(TRIM(id)) = UPPER(TRIM(?1))",
            params![protocol_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn protocol_uid_taken(&self, uid: &str) -> PortalResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM protocol WHERE uid = ?1",
            params![uid],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_protocol(&self, protocol_id: &str) -> PortalResult<Protocol> {
        self.conn
            .query_row(
                "SELECT id, uid, label, pic, is_active FROM protocol WHERE UPPER(TRIM(id)) = UPPER(TRIM(?1))",
                params![protocol_id],
                protocol_row_mapper,
            )
            .optional()?
            .ok_or_else(|| PortalError::not_found("protocol", protocol_id))
    }

    pub fn list_protocols(&self, active_only: bool) -> PortalResult<Vec<Protocol>> {
        let sql = if active_only {
            "SELECT id, uid, label, pic, is_active FROM protocol WHERE is_active = 1 ORDER BY label, id"
        } else {
            "SELECT id, uid, label, pic, is_active FROM protocol ORDER BY label, id"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], protocol_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn set_protocol_active(&self, protocol_id: &str, is_active: bool) -> PortalResult<()> {
        let changed = self.conn.execute(
            "UPDATE protocol SET is_active = ?1 WHERE UPPER(TRIM(id)) = UPPER(TRIM(?2))",
            params![if is_active { 1i32 } else { 0i32 }, protocol_id],
        )?;
        if changed == 0 {
            return Err(PortalError::not_found("protocol", protocol_id));
        }
        Ok(())
    }

    pub fn set_protocol_pic(&self, protocol_id: &str, pic: &PicAssignment) -> PortalResult<()> {
        let changed = self.conn.execute(
            "UPDATE protocol SET pic = ?1 WHERE UPPER(TRIM(id)) = UPPER(TRIM(?2))",
            params![serde_json::to_string(pic)?, protocol_id],
        )?;
        if changed == 0 {
            return Err(PortalError::not_found("protocol", protocol_id));
        }
        Ok(())
    }

    pub fn delete_protocol(&self, protocol_id: &str) -> PortalResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM protocol WHERE UPPER(TRIM(id)) = UPPER(TRIM(?1))", params![protocol_id])?;
        Ok(changed > 0)
    }
}

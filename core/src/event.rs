//! Change notifications.
//!
//! Every successful write produces one `PortalEvent`. The portal appends
//! it to the `event_log` table and fans it out to live subscribers.
//! Subscribers must not assume any ordering between events about
//! different documents.

use crate::{
    matrix::AssignmentEntry,
    registry::{BookingRule, Protocol},
    request::Request,
    status::RequestStatus,
    types::{EngineerName, Timestamp, UserId},
};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{channel, Receiver, Sender};

/// Variants are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PortalEvent {
    // ── Requests ───────────────────────────────────
    RequestSubmitted {
        request: Request,
    },
    RequestStatusChanged {
        from: RequestStatus,
        actor_id: UserId,
        request: Request,
    },

    // ── Assignment matrix ──────────────────────────
    AssignmentToggled {
        engineer: EngineerName,
        assigned: bool,
        entry: AssignmentEntry,
    },

    // ── Rule registry ──────────────────────────────
    BookingRuleSaved {
        rule: BookingRule,
    },
    BookingRuleDeleted {
        rule_id: String,
    },
    ProtocolSaved {
        protocol: Protocol,
    },
    ProtocolDeleted {
        protocol_id: String,
    },
}

impl PortalEvent {
    /// Stable name for the `event_type` column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::RequestSubmitted { .. } => "request_submitted",
            Self::RequestStatusChanged { .. } => "request_status_changed",
            Self::AssignmentToggled { .. } => "assignment_toggled",
            Self::BookingRuleSaved { .. } => "booking_rule_saved",
            Self::BookingRuleDeleted { .. } => "booking_rule_deleted",
            Self::ProtocolSaved { .. } => "protocol_saved",
            Self::ProtocolDeleted { .. } => "protocol_deleted",
        }
    }

    /// Id of the document the event is about.
    pub fn document_id(&self) -> &str {
        match self {
            Self::RequestSubmitted { request } => &request.id,
            Self::RequestStatusChanged { request, .. } => &request.id,
            Self::AssignmentToggled { entry, .. } => &entry.manager_id,
            Self::BookingRuleSaved { rule } => &rule.id,
            Self::BookingRuleDeleted { rule_id } => rule_id,
            Self::ProtocolSaved { protocol } => &protocol.id,
            Self::ProtocolDeleted { protocol_id } => protocol_id,
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub event_type: String,
    pub document_id: String,
    pub payload: String, // JSON-serialized PortalEvent
    pub recorded_at: Timestamp,
}

/// Fan-out to live subscribers. Dropped receivers are pruned on publish.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Sender<PortalEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<PortalEvent> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn publish(&mut self, event: &PortalEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

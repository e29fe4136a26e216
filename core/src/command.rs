use crate::{
    matrix::{AssignmentEntry, ManagerQuery, ManagerRow, Page},
    pic::PicAssignment,
    registry::{BookingRule, NewBookingRule, NewProtocol, Protocol, UpdateBookingRule},
    request::{NewRequest, Request},
    types::{RequestId, UserId},
};
use serde::{Deserialize, Serialize};

/// Everything a portal client can ask for, one JSON object per call.
/// Variants are added over time, never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum PortalCommand {
    // ── Requests ──────────────────────────────────
    SubmitRequest {
        actor_id: UserId,
        request: NewRequest,
    },
    ConfirmRequest {
        actor_id: UserId,
        request_id: RequestId,
        note: String,
    },
    CompleteRequest {
        actor_id: UserId,
        request_id: RequestId,
    },
    ListRequests {
        viewer_id: UserId,
    },

    // ── Assignment matrix ─────────────────────────
    ToggleAssignment {
        actor_id: UserId,
        manager_id: UserId,
        engineer: String,
        #[serde(default)]
        expected_version: Option<u64>,
    },
    ListManagers {
        actor_id: UserId,
        #[serde(default)]
        query: ManagerQuery,
    },

    // ── Rule registry ─────────────────────────────
    AddRule {
        actor_id: UserId,
        rule: NewBookingRule,
    },
    UpdateRule {
        actor_id: UserId,
        rule_id: String,
        update: UpdateBookingRule,
    },
    DeleteRule {
        actor_id: UserId,
        rule_id: String,
    },
    ListRules,
    AddProtocol {
        actor_id: UserId,
        protocol: NewProtocol,
    },
    SetProtocolPic {
        actor_id: UserId,
        protocol_id: String,
        pic: PicAssignment,
    },
    ToggleProtocol {
        actor_id: UserId,
        protocol_id: String,
    },
    DeleteProtocol {
        actor_id: UserId,
        protocol_id: String,
    },
    ListProtocols {
        #[serde(default)]
        active_only: bool,
    },
}

impl PortalCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SubmitRequest { .. } => "submit_request",
            Self::ConfirmRequest { .. } => "confirm_request",
            Self::CompleteRequest { .. } => "complete_request",
            Self::ListRequests { .. } => "list_requests",
            Self::ToggleAssignment { .. } => "toggle_assignment",
            Self::ListManagers { .. } => "list_managers",
            Self::AddRule { .. } => "add_rule",
            Self::UpdateRule { .. } => "update_rule",
            Self::DeleteRule { .. } => "delete_rule",
            Self::ListRules => "list_rules",
            Self::AddProtocol { .. } => "add_protocol",
            Self::SetProtocolPic { .. } => "set_protocol_pic",
            Self::ToggleProtocol { .. } => "toggle_protocol",
            Self::DeleteProtocol { .. } => "delete_protocol",
            Self::ListProtocols { .. } => "list_protocols",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum CommandOutcome {
    Request(Request),
    Requests(Vec<Request>),
    Assignment(AssignmentEntry),
    Managers(Page<ManagerRow>),
    Rule(BookingRule),
    Rules(Vec<BookingRule>),
    Protocol(Protocol),
    Protocols(Vec<Protocol>),
    Deleted { id: String },
}

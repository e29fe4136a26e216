//! Request lifecycle: PENDING → CONFIRMED → COMPLETED.
//!
//! `plan_transition` is pure. It checks the guard for the actor's
//! department and returns the partial document to merge into the stored
//! request. The store applies that patch only if the stored status still
//! equals `patch.from`.

use crate::{
    directory::{Department, User},
    error::{PortalError, PortalResult},
    types::{Timestamp, UserId},
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Confirmed,
    Completed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Completed => "COMPLETED",
        }
    }

    pub fn parse(raw: &str) -> PortalResult<Self> {
        match crate::normalize::normalize(raw).as_str() {
            "PENDING" => Ok(Self::Pending),
            "CONFIRMED" => Ok(Self::Confirmed),
            "COMPLETED" => Ok(Self::Completed),
            _ => Err(PortalError::validation(format!("unknown request status '{raw}'"))),
        }
    }

    /// The only state this one may move to.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Confirmed),
            Self::Confirmed => Some(Self::Completed),
            Self::Completed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is attempting a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub display_name: String,
    pub department: Department,
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            display_name: user.display_name().to_string(),
            department: user.department.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Confirm,
    Complete,
}

impl TransitionKind {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::Complete => "complete",
        }
    }

    pub fn from_status(&self) -> RequestStatus {
        match self {
            Self::Confirm => RequestStatus::Pending,
            Self::Complete => RequestStatus::Confirmed,
        }
    }

    pub fn to_status(&self) -> RequestStatus {
        match self {
            Self::Confirm => RequestStatus::Confirmed,
            Self::Complete => RequestStatus::Completed,
        }
    }

    fn department_allowed(&self, department: &Department) -> bool {
        match self {
            Self::Confirm => department.has_global_access(),
            Self::Complete => *department == Department::Sales,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Confirm { note: String },
    Complete,
}

impl Transition {
    pub fn kind(&self) -> TransitionKind {
        match self {
            Self::Confirm { .. } => TransitionKind::Confirm,
            Self::Complete => TransitionKind::Complete,
        }
    }
}

/// The action a department may take on a request in `status`, if any.
/// This is what drives enabling or disabling the action button.
pub fn permitted_transition(status: RequestStatus, department: &Department) -> Option<TransitionKind> {
    [TransitionKind::Confirm, TransitionKind::Complete]
        .into_iter()
        .find(|kind| kind.from_status() == status && kind.department_allowed(department))
}

/// Fields written by one transition. `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPatch {
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub confirmation_notes: Option<String>,
    pub confirmed_by: Option<String>,
    pub confirmed_at: Option<Timestamp>,
    pub completed_by: Option<String>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
    pub last_modified_by: UserId,
}

pub fn plan_transition(
    current: RequestStatus,
    actor: &Actor,
    transition: &Transition,
    now: Timestamp,
) -> PortalResult<StatusPatch> {
    let kind = transition.kind();
    let refuse = |reason: String| PortalError::TransitionRefused {
        from: current,
        action: kind.action(),
        reason,
    };

    if current != kind.from_status() {
        let reason = match current.next() {
            Some(next) => format!("only a move to {next} is possible"),
            None => "the request is already completed".to_string(),
        };
        return Err(refuse(reason));
    }
    if !kind.department_allowed(&actor.department) {
        return Err(refuse(format!(
            "department {} may not {} requests",
            actor.department,
            kind.action()
        )));
    }

    let mut patch = StatusPatch {
        from: current,
        to: kind.to_status(),
        confirmation_notes: None,
        confirmed_by: None,
        confirmed_at: None,
        completed_by: None,
        completed_at: None,
        updated_at: now,
        last_modified_by: actor.id.clone(),
    };

    match transition {
        Transition::Confirm { note } => {
            let note = note.trim();
            if note.is_empty() {
                return Err(refuse("a confirmation note is required".to_string()));
            }
            patch.confirmation_notes = Some(note.to_string());
            patch.confirmed_by = Some(actor.display_name.clone());
            patch.confirmed_at = Some(now);
        }
        Transition::Complete => {
            patch.completed_by = Some(actor.display_name.clone());
            patch.completed_at = Some(now);
        }
    }

    Ok(patch)
}

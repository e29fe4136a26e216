//! Admin-configured booking rules and protocols.
//!
//! Plain records plus the validation applied before they are stored.
//! Nothing here is joined live against requests: a request's PIC is
//! resolved once at submission, so editing or deleting a rule never
//! touches requests that already exist.

use crate::{
    error::{PortalError, PortalResult},
    pic::PicAssignment,
    types::Timestamp,
};
use serde::{Deserialize, Serialize};

/// Rules without an explicit priority sort after every prioritized one.
pub const DEFAULT_RULE_PRIORITY: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    /// `condition` is a sales team name.
    Team,
    /// `condition` is a protocol keyword.
    Specialist,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Team => "team",
            Self::Specialist => "specialist",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "team" => Some(Self::Team),
            "specialist" => Some(Self::Specialist),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRule {
    pub id: String,
    pub rule_type: RuleType,
    pub condition: String,
    pub assigned_pic: String,
    /// Lower runs first. Ties fall back to creation order.
    pub priority: i64,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBookingRule {
    pub rule_type: RuleType,
    pub condition: String,
    pub assigned_pic: String,
    #[serde(default)]
    pub priority: Option<i64>,
}

impl NewBookingRule {
    pub fn validate(&self) -> PortalResult<()> {
        require("condition", &self.condition)?;
        require("assigned PIC", &self.assigned_pic)
    }
}

/// Partial edit. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBookingRule {
    pub rule_type: Option<RuleType>,
    pub condition: Option<String>,
    pub assigned_pic: Option<String>,
    pub priority: Option<i64>,
}

impl BookingRule {
    pub fn apply_update(&mut self, update: &UpdateBookingRule) -> PortalResult<()> {
        if let Some(condition) = &update.condition {
            require("condition", condition)?;
            self.condition = condition.trim().to_string();
        }
        if let Some(pic) = &update.assigned_pic {
            require("assigned PIC", pic)?;
            self.assigned_pic = pic.trim().to_string();
        }
        if let Some(rule_type) = update.rule_type {
            self.rule_type = rule_type;
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        Ok(())
    }
}

/// A bookable engineering service and the engineer(s) behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protocol {
    /// Selection id used in requests, e.g. `"dialux"`.
    pub id: String,
    /// Generated `PRT-####` code.
    pub uid: String,
    pub label: String,
    pub pic: PicAssignment,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProtocol {
    pub id: String,
    pub label: String,
    pub pic: PicAssignment,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl NewProtocol {
    pub fn validate(&self) -> PortalResult<()> {
        require("protocol id", &self.id)?;
        if self.id.trim().contains(char::is_whitespace) {
            return Err(PortalError::validation(format!(
                "protocol id '{}' must not contain whitespace",
                self.id.trim()
            )));
        }
        require("label", &self.label)?;
        if self.pic.is_empty() {
            return Err(PortalError::validation("a protocol needs at least one PIC"));
        }
        Ok(())
    }
}

fn require(field: &str, value: &str) -> PortalResult<()> {
    if value.trim().is_empty() {
        return Err(PortalError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

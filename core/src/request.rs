//! Site-visit and shop-drawing requests.

use crate::{
    pic::PicAssignment,
    status::{RequestStatus, StatusPatch},
    types::{RequestId, Timestamp, UserId},
    visibility::Submitted,
};
use serde::{Deserialize, Serialize};

/// Department tag stamped on every new request. Records carrying it are
/// routed to engineering.
pub const ROUTED_DEPARTMENT: &str = "ENGINEERING";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    SiteVisit,
    ShopDrawing,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SiteVisit => "site_visit",
            Self::ShopDrawing => "shop_drawing",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "site_visit" => Some(Self::SiteVisit),
            "shop_drawing" => Some(Self::ShopDrawing),
            _ => None,
        }
    }
}

/// What a sales user fills in. The PIC, status and stamps are derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRequest {
    pub kind: RequestKind,
    /// Selected protocol ids, e.g. `"dialux"`, `"costing"`.
    pub protocols: Vec<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub agenda: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub file_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub kind: RequestKind,
    pub submitted_by: UserId,
    pub department: String,
    pub protocols: Vec<String>,
    pub pic: PicAssignment,
    pub status: RequestStatus,
    pub client: String,
    pub address: String,
    pub agenda: String,
    pub notes: String,
    pub file_url: Option<String>,
    pub confirmation_notes: Option<String>,
    pub confirmed_by: Option<String>,
    pub confirmed_at: Option<Timestamp>,
    pub completed_by: Option<String>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub last_modified_by: UserId,
    /// Bumped on every write. Subscribers keep the highest one they see.
    pub revision: u64,
}

impl Request {
    /// Merge a transition patch. Only the stamped fields change.
    pub fn apply_patch(&mut self, patch: &StatusPatch) {
        self.status = patch.to;
        if let Some(notes) = &patch.confirmation_notes {
            self.confirmation_notes = Some(notes.clone());
        }
        if let Some(by) = &patch.confirmed_by {
            self.confirmed_by = Some(by.clone());
        }
        if patch.confirmed_at.is_some() {
            self.confirmed_at = patch.confirmed_at;
        }
        if let Some(by) = &patch.completed_by {
            self.completed_by = Some(by.clone());
        }
        if patch.completed_at.is_some() {
            self.completed_at = patch.completed_at;
        }
        self.updated_at = patch.updated_at;
        self.last_modified_by = patch.last_modified_by.clone();
        self.revision += 1;
    }
}

impl Submitted for Request {
    fn submitted_by(&self) -> &str {
        &self.submitted_by
    }
}

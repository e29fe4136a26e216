//! Sales manager ↔ engineer assignment matrix.
//!
//! Each manager owns one entry holding the set of engineers who handle
//! that manager's requests. Entries are versioned: a write names the
//! version it was computed from and is rejected if the stored entry has
//! moved on since.

use crate::{
    directory::User,
    error::{PortalError, PortalResult},
    normalize::{contains, same},
    pic::PicAssignment,
    types::{EngineerName, Timestamp, UserId},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentEntry {
    pub manager_id: UserId,
    pub manager_name: String,
    pub assigned_pics: BTreeSet<EngineerName>,
    /// 0 means "never written".
    pub version: u64,
    pub updated_at: Option<Timestamp>,
}

impl AssignmentEntry {
    pub fn empty(manager_id: impl Into<UserId>, manager_name: impl Into<String>) -> Self {
        Self {
            manager_id: manager_id.into(),
            manager_name: manager_name.into(),
            assigned_pics: BTreeSet::new(),
            version: 0,
            updated_at: None,
        }
    }

    pub fn contains(&self, engineer: &str) -> bool {
        self.assigned_pics.iter().any(|name| same(name, engineer))
    }

    /// The assigned engineers as a PIC, if there are any.
    pub fn as_pic(&self) -> Option<PicAssignment> {
        if self.assigned_pics.is_empty() {
            None
        } else {
            Some(PicAssignment::many(self.assigned_pics.iter().cloned()).normalized())
        }
    }
}

/// Flip one engineer's membership. Matching ignores case and padding;
/// a newly added name is stored trimmed.
pub fn toggle_membership(set: &BTreeSet<EngineerName>, engineer: &str) -> BTreeSet<EngineerName> {
    let engineer = engineer.trim();
    let mut next: BTreeSet<EngineerName> =
        set.iter().filter(|name| !same(name, engineer)).cloned().collect();
    if next.len() == set.len() {
        next.insert(engineer.to_string());
    }
    next
}

// ── Admin read model ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub enum PageSize {
    Five,
    #[default]
    Ten,
    Twenty,
    Fifty,
}

impl PageSize {
    pub fn get(&self) -> usize {
        match self {
            Self::Five => 5,
            Self::Ten => 10,
            Self::Twenty => 20,
            Self::Fifty => 50,
        }
    }
}

impl TryFrom<usize> for PageSize {
    type Error = PortalError;

    fn try_from(value: usize) -> PortalResult<Self> {
        match value {
            5 => Ok(Self::Five),
            10 => Ok(Self::Ten),
            20 => Ok(Self::Twenty),
            50 => Ok(Self::Fifty),
            other => Err(PortalError::validation(format!(
                "page size {other} is not one of 5, 10, 20, 50"
            ))),
        }
    }
}

impl From<PageSize> for usize {
    fn from(size: PageSize) -> Self {
        size.get()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagerQuery {
    /// Matched against name and reference id.
    #[serde(default)]
    pub search: String,
    /// Zero-based.
    #[serde(default)]
    pub page: usize,
    #[serde(default)]
    pub page_size: PageSize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerRow {
    pub manager: User,
    pub assigned_pics: BTreeSet<EngineerName>,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Matches across all pages.
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

impl<T> Page<T> {
    pub fn page_count(&self) -> usize {
        self.total.div_ceil(self.page_size.max(1))
    }
}

/// Filter, sort by name, then slice one page out of the sales managers.
pub fn manager_page(
    users: Vec<User>,
    entries: &HashMap<UserId, AssignmentEntry>,
    query: &ManagerQuery,
) -> Page<ManagerRow> {
    let mut managers: Vec<User> = users
        .into_iter()
        .filter(User::is_sales_manager)
        .filter(|u| contains(&u.name, &query.search) || contains(&u.reference_id, &query.search))
        .collect();
    managers.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });

    let total = managers.len();
    let size = query.page_size.get();
    let items = managers
        .into_iter()
        .skip(query.page.saturating_mul(size))
        .take(size)
        .map(|manager| {
            let (assigned_pics, version) = entries
                .get(&manager.id)
                .map(|e| (e.assigned_pics.clone(), e.version))
                .unwrap_or_default();
            ManagerRow {
                manager,
                assigned_pics,
                version,
            }
        })
        .collect();

    Page {
        items,
        total,
        page: query.page,
        page_size: size,
    }
}

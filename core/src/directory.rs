//! User/department directory.
//!
//! The directory is an external collaborator: the core only ever asks it
//! for one user by id or for the full roster. `CachedDirectory` wraps any
//! implementation with a TTL cache that is owned by whoever injects it.

use crate::{
    clock::Clock,
    error::PortalResult,
    normalize::{contains, normalize},
    types::{Timestamp, UserId},
    visibility::has_global_access,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};

// ── Department ───────────────────────────────────────────────────────────────

/// Department as recorded on a user. Parsing goes through the central
/// normalizer, so `" engineering"` and `"ENGINEERING"` are the same value.
/// A blank department falls back to `Sales`, the most restrictive one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Department {
    #[default]
    Sales,
    Engineering,
    It,
    Other(String),
}

impl Department {
    pub fn parse(raw: &str) -> Self {
        match normalize(raw).as_str() {
            "" | "SALES" => Self::Sales,
            "ENGINEERING" => Self::Engineering,
            "IT" => Self::It,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Sales => "SALES",
            Self::Engineering => "ENGINEERING",
            Self::It => "IT",
            Self::Other(name) => name,
        }
    }

    /// Departments that see every request regardless of submitter.
    pub fn has_global_access(&self) -> bool {
        has_global_access(self.as_str())
    }
}

impl From<String> for Department {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<Department> for String {
    fn from(department: Department) -> Self {
        department.as_str().to_string()
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── User ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub department: Department,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub reference_id: String,
}

impl User {
    /// Name stamped into `confirmed_by` / `completed_by`. Falls back to the id.
    pub fn display_name(&self) -> &str {
        let name = self.name.trim();
        if name.is_empty() {
            &self.id
        } else {
            name
        }
    }

    pub fn is_admin(&self) -> bool {
        normalize(&self.role) == "ADMIN"
    }

    /// Sales staff whose role or position mentions "manager".
    pub fn is_sales_manager(&self) -> bool {
        self.department == Department::Sales
            && (contains(&self.position, "manager") || contains(&self.role, "manager"))
    }
}

// ── Directory contract ───────────────────────────────────────────────────────

pub trait UserDirectory {
    /// `Ok(None)` means the directory answered and the user does not exist.
    /// `Err` means the directory could not be asked.
    fn lookup(&self, id: &str) -> PortalResult<Option<User>>;

    fn list(&self) -> PortalResult<Vec<User>>;

    fn list_department(&self, department: &Department) -> PortalResult<Vec<User>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|u| &u.department == department)
            .collect())
    }
}

impl<D: UserDirectory + ?Sized> UserDirectory for Box<D> {
    fn lookup(&self, id: &str) -> PortalResult<Option<User>> {
        (**self).lookup(id)
    }

    fn list(&self) -> PortalResult<Vec<User>> {
        (**self).list()
    }
}

/// A fixed roster held in memory, keyed by user id.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    users: BTreeMap<UserId, User>,
}

#[derive(Debug, Deserialize)]
struct UsersFile {
    users: Vec<User>,
}

impl StaticDirectory {
    pub fn from_users(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.id.clone(), u)).collect(),
        }
    }

    /// Load `{ "users": [...] }` from a JSON file.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let file: UsersFile = serde_json::from_str(&content)?;
        Ok(Self::from_users(file.users))
    }

    pub fn insert(&mut self, user: User) {
        self.users.insert(user.id.clone(), user);
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserDirectory for StaticDirectory {
    fn lookup(&self, id: &str) -> PortalResult<Option<User>> {
        Ok(self.users.get(id).cloned())
    }

    fn list(&self) -> PortalResult<Vec<User>> {
        Ok(self.users.values().cloned().collect())
    }
}

// ── TTL cache ────────────────────────────────────────────────────────────────

struct Cached<T> {
    value: T,
    fetched_at: Timestamp,
}

/// Read-through cache in front of a directory.
///
/// Entries (including "no such user" answers) live for `ttl`. Failed
/// lookups are never cached, so an outage is retried on the next call.
pub struct CachedDirectory<D> {
    inner: D,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    users: Mutex<HashMap<UserId, Cached<Option<User>>>>,
    roster: Mutex<Option<Cached<Vec<User>>>>,
}

impl<D: UserDirectory> CachedDirectory<D> {
    pub fn new(inner: D, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            inner,
            clock,
            ttl,
            users: Mutex::new(HashMap::new()),
            roster: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut D {
        &mut self.inner
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Drop one user's entry and the cached roster.
    pub fn invalidate(&self, id: &str) {
        self.users.lock().unwrap_or_else(|e| e.into_inner()).remove(id);
        *self.roster.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn clear(&self) {
        self.users.lock().unwrap_or_else(|e| e.into_inner()).clear();
        *self.roster.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn is_fresh(&self, fetched_at: Timestamp, now: Timestamp) -> bool {
        now - fetched_at < self.ttl
    }
}

impl<D: UserDirectory> UserDirectory for CachedDirectory<D> {
    fn lookup(&self, id: &str) -> PortalResult<Option<User>> {
        let now = self.clock.now();
        {
            let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(hit) = users.get(id) {
                if self.is_fresh(hit.fetched_at, now) {
                    return Ok(hit.value.clone());
                }
            }
        }

        let value = self.inner.lookup(id)?;
        log::debug!("directory cache miss: user={id} found={}", value.is_some());
        self.users.lock().unwrap_or_else(|e| e.into_inner()).insert(
            id.to_string(),
            Cached {
                value: value.clone(),
                fetched_at: now,
            },
        );
        Ok(value)
    }

    fn list(&self) -> PortalResult<Vec<User>> {
        let now = self.clock.now();
        {
            let roster = self.roster.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(hit) = roster.as_ref() {
                if self.is_fresh(hit.fetched_at, now) {
                    return Ok(hit.value.clone());
                }
            }
        }

        let value = self.inner.list()?;
        *self.roster.lock().unwrap_or_else(|e| e.into_inner()) = Some(Cached {
            value: value.clone(),
            fetched_at: now,
        });
        Ok(value)
    }
}

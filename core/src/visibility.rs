//! Which requests a viewer may list.
//!
//! ENGINEERING and IT see everything. Every other department sees only
//! what its own user submitted. Anything that prevents us from knowing
//! the viewer's department resolves to the restricted scope.

use crate::{
    directory::{Department, UserDirectory},
    normalize::normalize,
    types::UserId,
};

/// The complete allow-list of departments with global access.
pub const GLOBAL_ACCESS_DEPARTMENTS: [&str; 2] = ["ENGINEERING", "IT"];

pub fn has_global_access(department: &str) -> bool {
    let department = normalize(department);
    GLOBAL_ACCESS_DEPARTMENTS.contains(&department.as_str())
}

/// How a listing query is scoped. The store turns `OwnSubmissions` into a
/// `submitted_by = ?` predicate and `Global` into no predicate at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessScope {
    Global,
    OwnSubmissions(UserId),
}

/// Anything listed per viewer: it only needs to say who submitted it.
pub trait Submitted {
    fn submitted_by(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub id: UserId,
    pub department: Department,
}

impl Viewer {
    pub fn new(id: impl Into<UserId>, department: Department) -> Self {
        Self {
            id: id.into(),
            department,
        }
    }

    /// Look the viewer up in the directory. A missing user or a failing
    /// directory both produce a SALES viewer.
    pub fn resolve<D: UserDirectory + ?Sized>(directory: &D, id: &str) -> Self {
        let department = match directory.lookup(id) {
            Ok(Some(user)) => user.department,
            Ok(None) => {
                log::warn!("visibility: unknown viewer {id}, restricting to own submissions");
                Department::Sales
            }
            Err(e) => {
                log::warn!("visibility: directory lookup failed for {id} ({e}), restricting to own submissions");
                Department::Sales
            }
        };
        Self::new(id, department)
    }

    pub fn scope(&self) -> AccessScope {
        if self.department.has_global_access() {
            AccessScope::Global
        } else {
            AccessScope::OwnSubmissions(self.id.clone())
        }
    }

    pub fn can_see<R: Submitted + ?Sized>(&self, record: &R) -> bool {
        match self.scope() {
            AccessScope::Global => true,
            AccessScope::OwnSubmissions(id) => record.submitted_by() == id,
        }
    }
}

/// In-memory equivalent of the scoped store query, for records that
/// arrive through a subscription instead of a listing.
pub fn filter_visible<'a, R, I>(viewer: &Viewer, records: I) -> Vec<&'a R>
where
    R: Submitted + 'a,
    I: IntoIterator<Item = &'a R>,
{
    records.into_iter().filter(|r| viewer.can_see(*r)).collect()
}

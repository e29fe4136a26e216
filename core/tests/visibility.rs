//! Visibility tests: scoped store listings, the department allow-list
//! and the fail-closed fallback when the directory cannot answer.

use chrono::{TimeZone, Utc};
use portal_core::{
    directory::{Department, StaticDirectory, User, UserDirectory},
    error::{PortalError, PortalResult},
    pic::PicAssignment,
    request::{Request, RequestKind},
    status::RequestStatus,
    store::PortalStore,
    visibility::{filter_visible, AccessScope, Viewer},
};

fn request(id: &str, submitted_by: &str, minute: u32) -> Request {
    let at = Utc.with_ymd_and_hms(2024, 5, 2, 8, minute, 0).unwrap();
    Request {
        id: id.into(),
        kind: RequestKind::SiteVisit,
        submitted_by: submitted_by.into(),
        department: "ENGINEERING".into(),
        protocols: vec!["site_survey".into()],
        pic: PicAssignment::one("Patrick"),
        status: RequestStatus::Pending,
        client: format!("Client of {submitted_by}"),
        address: "12 Harbour Rd".into(),
        agenda: String::new(),
        notes: String::new(),
        file_url: None,
        confirmation_notes: None,
        confirmed_by: None,
        confirmed_at: None,
        completed_by: None,
        completed_at: None,
        created_at: at,
        updated_at: at,
        last_modified_by: submitted_by.into(),
        revision: 1,
    }
}

fn seeded_store() -> PortalStore {
    let store = PortalStore::in_memory().unwrap();
    store.migrate().unwrap();
    store.insert_request(&request("r1", "u1", 1)).unwrap();
    store.insert_request(&request("r2", "u2", 2)).unwrap();
    store.insert_request(&request("r3", "u1", 3)).unwrap();
    store.insert_request(&request("r4", "u3", 4)).unwrap();
    store
}

fn user(id: &str, department: &str) -> User {
    User {
        id: id.into(),
        name: id.to_uppercase(),
        department: Department::parse(department),
        role: "staff".into(),
        position: String::new(),
        reference_id: String::new(),
    }
}

struct UnreachableDirectory;

impl UserDirectory for UnreachableDirectory {
    fn lookup(&self, _id: &str) -> PortalResult<Option<User>> {
        Err(PortalError::DirectoryUnavailable("connection refused".into()))
    }

    fn list(&self) -> PortalResult<Vec<User>> {
        Err(PortalError::DirectoryUnavailable("connection refused".into()))
    }
}

fn ids(requests: &[Request]) -> Vec<&str> {
    requests.iter().map(|r| r.id.as_str()).collect()
}

/// A SALES viewer "u1" sees only u1's records, even though u2 (also SALES)
/// submitted others.
#[test]
fn sales_viewer_sees_only_own_submissions() {
    let store = seeded_store();
    let viewer = Viewer::new("u1", Department::Sales);
    let listed = store.list_requests(&viewer.scope()).unwrap();
    assert_eq!(ids(&listed), vec!["r3", "r1"]);
    assert!(listed.iter().all(|r| r.submitted_by == "u1"));
}

/// ENGINEERING and IT see every record, newest first.
#[test]
fn global_departments_see_everything() {
    let store = seeded_store();
    for department in ["ENGINEERING", " engineering", "It", "IT "] {
        let viewer = Viewer::new("someone", Department::parse(department));
        assert_eq!(viewer.scope(), AccessScope::Global, "department {department:?}");
        let listed = store.list_requests(&viewer.scope()).unwrap();
        assert_eq!(ids(&listed), vec!["r4", "r3", "r2", "r1"]);
    }
}

/// Departments outside the allow-list are restricted like SALES.
#[test]
fn other_departments_are_restricted() {
    let store = seeded_store();
    for department in ["SALES", "FINANCE", "engineering support", ""] {
        let viewer = Viewer::new("u2", Department::parse(department));
        let listed = store.list_requests(&viewer.scope()).unwrap();
        assert_eq!(ids(&listed), vec!["r2"], "department {department:?}");
    }
}

#[test]
fn viewer_department_comes_from_directory() {
    let directory = StaticDirectory::from_users([
        user("eng", "Engineering"),
        user("u1", "SALES"),
        user("blank", ""),
    ]);
    assert_eq!(Viewer::resolve(&directory, "eng").scope(), AccessScope::Global);
    assert_eq!(
        Viewer::resolve(&directory, "u1").scope(),
        AccessScope::OwnSubmissions("u1".into())
    );
    assert_eq!(Viewer::resolve(&directory, "blank").department, Department::Sales);
}

/// Unknown viewers and directory outages both fall back to SALES.
#[test]
fn unresolvable_viewer_fails_closed() {
    let directory = StaticDirectory::from_users([user("eng", "ENGINEERING")]);
    let unknown = Viewer::resolve(&directory, "ghost");
    assert_eq!(unknown.department, Department::Sales);
    assert_eq!(unknown.scope(), AccessScope::OwnSubmissions("ghost".into()));

    let outage = Viewer::resolve(&UnreachableDirectory, "eng");
    assert_eq!(outage.department, Department::Sales);

    let store = seeded_store();
    assert!(store.list_requests(&outage.scope()).unwrap().is_empty());
}

/// The in-memory filter agrees with the store query for every viewer.
#[test]
fn in_memory_filter_matches_store_query() {
    let store = seeded_store();
    let all = store.list_requests(&AccessScope::Global).unwrap();
    for viewer in [
        Viewer::new("u1", Department::Sales),
        Viewer::new("u3", Department::Other("FINANCE".into())),
        Viewer::new("x", Department::It),
        Viewer::new("nobody", Department::Sales),
    ] {
        let filtered: Vec<&str> = filter_visible(&viewer, &all)
            .into_iter()
            .map(|r| r.id.as_str())
            .collect();
        let queried = store.list_requests(&viewer.scope()).unwrap();
        assert_eq!(filtered, ids(&queried), "viewer {viewer:?}");
    }
}

//! Request status machine tests: PENDING → CONFIRMED → COMPLETED, who may
//! move a request, and the guarded partial write behind each move.

use chrono::{Duration, TimeZone, Utc};
use portal_core::{
    clock::{Clock, ManualClock},
    directory::{Department, StaticDirectory, User},
    error::PortalError,
    pic::PicAssignment,
    portal::Portal,
    registry::NewProtocol,
    request::{NewRequest, RequestKind},
    status::{permitted_transition, plan_transition, Actor, RequestStatus, Transition, TransitionKind},
};
use std::sync::Arc;

fn user(id: &str, name: &str, department: &str, role: &str) -> User {
    User {
        id: id.into(),
        name: name.into(),
        department: Department::parse(department),
        role: role.into(),
        position: String::new(),
        reference_id: String::new(),
    }
}

fn portal() -> (Portal<StaticDirectory>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()));
    let directory = StaticDirectory::from_users([
        user("admin", "Portal Admin", "IT", "admin"),
        user("eng", "Therese Lim", "ENGINEERING", "engineer"),
        user("it", "Ivy Tan", "it", "staff"),
        user("u1", "Carla Diaz", "SALES", "sales"),
        user("u2", "Dan Uy", "SALES", "sales"),
    ]);
    let mut portal = Portal::build_test(directory, clock.clone()).unwrap();
    portal
        .add_protocol(
            "admin",
            NewProtocol {
                id: "site_survey".into(),
                label: "Site Survey".into(),
                pic: PicAssignment::one("Patrick"),
                is_active: true,
            },
        )
        .unwrap();
    (portal, clock)
}

fn site_visit() -> NewRequest {
    NewRequest {
        kind: RequestKind::SiteVisit,
        protocols: vec!["site_survey".into()],
        team: None,
        client: "Harbour Hotel".into(),
        address: "12 Harbour Rd".into(),
        agenda: "Lobby relamp".into(),
        notes: String::new(),
        file_url: None,
    }
}

fn actor(department: Department) -> Actor {
    Actor {
        id: "a".into(),
        display_name: "A".into(),
        department,
    }
}

/// Only one forward move exists per state, and only for the right department.
#[test]
fn permitted_transitions_follow_fixed_order() {
    let engineering = Department::Engineering;
    let sales = Department::Sales;
    assert_eq!(
        permitted_transition(RequestStatus::Pending, &engineering),
        Some(TransitionKind::Confirm)
    );
    assert_eq!(
        permitted_transition(RequestStatus::Pending, &Department::It),
        Some(TransitionKind::Confirm)
    );
    assert_eq!(permitted_transition(RequestStatus::Pending, &sales), None);
    assert_eq!(
        permitted_transition(RequestStatus::Confirmed, &sales),
        Some(TransitionKind::Complete)
    );
    assert_eq!(permitted_transition(RequestStatus::Confirmed, &engineering), None);
    assert!(RequestStatus::Completed.is_terminal());
    assert!(!RequestStatus::Confirmed.is_terminal());
    for department in [sales, engineering, Department::It, Department::Other("HR".into())] {
        assert_eq!(permitted_transition(RequestStatus::Completed, &department), None);
    }
}

/// No transition skips a state or leaves COMPLETED.
#[test]
fn plan_refuses_out_of_order_moves() {
    let now = Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap();
    let confirm = Transition::Confirm {
        note: "ok".into(),
    };

    let skip = plan_transition(RequestStatus::Pending, &actor(Department::Sales), &Transition::Complete, now);
    assert!(matches!(
        skip,
        Err(PortalError::TransitionRefused { from: RequestStatus::Pending, action: "complete", .. })
    ));

    for transition in [confirm.clone(), Transition::Complete] {
        for department in [Department::Sales, Department::Engineering] {
            let result = plan_transition(RequestStatus::Completed, &actor(department), &transition, now);
            assert!(matches!(
                result,
                Err(PortalError::TransitionRefused { from: RequestStatus::Completed, .. })
            ));
        }
    }

    let again = plan_transition(RequestStatus::Confirmed, &actor(Department::Engineering), &confirm, now);
    assert!(again.is_err());
}

#[test]
fn confirm_requires_a_note() {
    let now = Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap();
    let blank = Transition::Confirm {
        note: "   ".into(),
    };
    assert!(plan_transition(RequestStatus::Pending, &actor(Department::Engineering), &blank, now).is_err());
}

/// PENDING confirmed by engineering with a note, then completed by the
/// submitter. COMPLETED is terminal.
#[test]
fn confirm_then_complete_scenario() {
    let (mut portal, clock) = portal();
    let request = portal.submit_request("u1", site_visit()).unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.revision, 1);

    clock.advance(Duration::hours(2));
    let confirmed = portal
        .confirm_request(&request.id, "eng", "Checked onsite")
        .unwrap();
    assert_eq!(confirmed.status, RequestStatus::Confirmed);
    assert_eq!(confirmed.confirmation_notes.as_deref(), Some("Checked onsite"));
    assert_eq!(confirmed.confirmed_by.as_deref(), Some("Therese Lim"));
    assert_eq!(confirmed.confirmed_at, Some(clock.now()));
    assert_eq!(confirmed.updated_at, clock.now());
    assert_eq!(confirmed.last_modified_by, "eng");
    assert_eq!(confirmed.revision, 2);
    // Fields outside the patch are untouched.
    assert_eq!(confirmed.client, request.client);
    assert_eq!(confirmed.created_at, request.created_at);
    assert_eq!(confirmed.pic, request.pic);

    clock.advance(Duration::days(1));
    let completed = portal.complete_request(&request.id, "u1").unwrap();
    assert_eq!(completed.status, RequestStatus::Completed);
    assert_eq!(completed.completed_by.as_deref(), Some("Carla Diaz"));
    assert_eq!(completed.completed_at, Some(clock.now()));
    assert_eq!(completed.confirmed_by.as_deref(), Some("Therese Lim"));
    assert_eq!(completed.revision, 3);

    let stored_before = portal.store().get_request(&request.id).unwrap();
    assert!(portal.complete_request(&request.id, "u1").is_err());
    assert!(portal.confirm_request(&request.id, "eng", "again").is_err());
    assert_eq!(portal.store().get_request(&request.id).unwrap(), stored_before);
    assert_eq!(portal.available_transition(&request.id, "u1").unwrap(), None);
}

#[test]
fn wrong_department_is_refused() {
    let (mut portal, _clock) = portal();
    let request = portal.submit_request("u1", site_visit()).unwrap();

    assert!(matches!(
        portal.confirm_request(&request.id, "u1", "looks fine"),
        Err(PortalError::TransitionRefused { .. })
    ));
    assert!(matches!(
        portal.complete_request(&request.id, "u1"),
        Err(PortalError::TransitionRefused { .. })
    ));

    portal.confirm_request(&request.id, "it", "Booked for Monday").unwrap();
    assert!(matches!(
        portal.complete_request(&request.id, "eng"),
        Err(PortalError::TransitionRefused { .. })
    ));
    assert_eq!(
        portal.store().get_request(&request.id).unwrap().status,
        RequestStatus::Confirmed
    );
}

/// A SALES user cannot act on another user's request.
#[test]
fn complete_requires_visibility() {
    let (mut portal, _clock) = portal();
    let request = portal.submit_request("u1", site_visit()).unwrap();
    portal.confirm_request(&request.id, "eng", "Checked onsite").unwrap();

    assert!(matches!(
        portal.complete_request(&request.id, "u2"),
        Err(PortalError::Forbidden { .. })
    ));
    assert_eq!(portal.available_transition(&request.id, "u2").unwrap(), None);
    assert_eq!(
        portal.available_transition(&request.id, "u1").unwrap(),
        Some(TransitionKind::Complete)
    );
}

/// A patch computed against a status that has since moved on is not written.
#[test]
fn stale_patch_is_not_applied() {
    let (mut portal, clock) = portal();
    let request = portal.submit_request("u1", site_visit()).unwrap();

    let eng = Actor {
        id: "eng".into(),
        display_name: "Therese Lim".into(),
        department: Department::Engineering,
    };
    let note = Transition::Confirm {
        note: "first".into(),
    };
    let first = plan_transition(RequestStatus::Pending, &eng, &note, clock.now()).unwrap();
    let second = first.clone();

    let written = portal.store().apply_status_patch(&request.id, &first).unwrap();
    let mut local = request.clone();
    local.apply_patch(&first);
    assert_eq!(written, local);

    let result = portal.store().apply_status_patch(&request.id, &second);
    assert!(matches!(
        result,
        Err(PortalError::TransitionRefused { from: RequestStatus::Confirmed, .. })
    ));
    assert_eq!(portal.store().get_request(&request.id).unwrap().revision, 2);
}

#[test]
fn unknown_request_or_actor_is_not_found() {
    let (mut portal, _clock) = portal();
    assert!(matches!(
        portal.confirm_request("missing", "eng", "note"),
        Err(PortalError::NotFound { entity: "request", .. })
    ));
    let request = portal.submit_request("u1", site_visit()).unwrap();
    assert!(matches!(
        portal.confirm_request(&request.id, "ghost", "note"),
        Err(PortalError::NotFound { entity: "user", .. })
    ));
}

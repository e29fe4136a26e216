//! Live view tests: subscription fan-out, per-viewer filtering and
//! convergence under duplicated or reordered deliveries.

use chrono::{Duration, TimeZone, Utc};
use portal_core::{
    clock::ManualClock,
    directory::{Department, StaticDirectory, User},
    event::{EventBus, PortalEvent},
    live::LiveRequestView,
    pic::PicAssignment,
    portal::Portal,
    registry::NewProtocol,
    request::{NewRequest, RequestKind},
    status::RequestStatus,
    visibility::Viewer,
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
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 10, 1, 8, 0, 0).unwrap()));
    let directory = StaticDirectory::from_users([
        user("admin", "Portal Admin", "IT", "admin"),
        user("eng", "Therese Lim", "ENGINEERING", "engineer"),
        user("u1", "Carla Diaz", "SALES", "sales"),
        user("u2", "Dan Uy", "SALES", "sales"),
    ]);
    let mut portal = Portal::build_test(directory, clock.clone()).unwrap();
    portal
        .add_protocol(
            "admin",
            NewProtocol {
                id: "costing".into(),
                label: "Costing".into(),
                pic: PicAssignment::many(["Mark", "Karl"]),
                is_active: true,
            },
        )
        .unwrap();
    (portal, clock)
}

fn costing(client: &str) -> NewRequest {
    NewRequest {
        kind: RequestKind::ShopDrawing,
        protocols: vec!["costing".into()],
        team: None,
        client: client.into(),
        address: String::new(),
        agenda: String::new(),
        notes: String::new(),
        file_url: Some("https://files.example.test/drawing.pdf".into()),
    }
}

#[test]
fn views_follow_writes_for_their_viewer() {
    let (mut portal, clock) = portal();
    let early = portal.submit_request("u1", costing("Early")).unwrap();

    let (mut engineering, eng_rx) = portal.live_view("eng").unwrap();
    let (mut sales, sales_rx) = portal.live_view("u2").unwrap();
    assert_eq!(engineering.len(), 1);
    assert!(sales.is_empty());

    clock.advance(Duration::minutes(10));
    let mine = portal.submit_request("u2", costing("Mine")).unwrap();
    portal.confirm_request(&early.id, "eng", "Quoted").unwrap();

    assert_eq!(engineering.drain(&eng_rx), 2);
    assert_eq!(sales.drain(&sales_rx), 1);

    let ids: Vec<&str> = engineering.requests().iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec![mine.id.as_str(), early.id.as_str()]);
    assert_eq!(
        engineering.get(&early.id).unwrap().status,
        RequestStatus::Confirmed
    );
    assert!(sales.get(&early.id).is_none());
    assert_eq!(sales.get(&mine.id).unwrap().client, "Mine");
}

/// Whatever order revisions arrive in, the view keeps the newest.
#[test]
fn out_of_order_delivery_converges() {
    let (mut portal, _clock) = portal();
    let rx = portal.subscribe();
    let request = portal.submit_request("u1", costing("Harbour")).unwrap();
    portal.confirm_request(&request.id, "eng", "Quoted").unwrap();
    portal.complete_request(&request.id, "u1").unwrap();

    let events: Vec<PortalEvent> = rx.try_iter().collect();
    assert_eq!(events.len(), 3);

    let mut forward = LiveRequestView::new(Viewer::new("eng", Department::Engineering));
    let mut reverse = LiveRequestView::new(Viewer::new("eng", Department::Engineering));
    for event in &events {
        forward.apply(event);
    }
    for event in events.iter().rev() {
        reverse.apply(event);
    }
    // Redelivery changes nothing.
    assert!(!forward.apply(&events[1]));

    let a = forward.get(&request.id).unwrap();
    let b = reverse.get(&request.id).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.status, RequestStatus::Completed);
    assert_eq!(a.revision, 3);
}

/// Non-request events never touch a request view.
#[test]
fn other_events_are_ignored() {
    let (mut portal, _clock) = portal();
    let (mut view, rx) = portal.live_view("eng").unwrap();
    portal.toggle_protocol_active("admin", "costing").unwrap();
    portal.toggle_assignment("admin", "u1", "Mark").unwrap();
    assert_eq!(view.drain(&rx), 0);
    assert!(view.is_empty());
}

#[test]
fn every_write_is_logged() {
    let (mut portal, _clock) = portal();
    let request = portal.submit_request("u1", costing("Harbour")).unwrap();
    portal.confirm_request(&request.id, "eng", "Quoted").unwrap();

    let log = portal.store().events_for_document(&request.id).unwrap();
    let types: Vec<&str> = log.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec!["request_submitted", "request_status_changed"]);

    let last: PortalEvent = serde_json::from_str(&log[1].payload).unwrap();
    match last {
        PortalEvent::RequestStatusChanged { from, actor_id, request: stored } => {
            assert_eq!(from, RequestStatus::Pending);
            assert_eq!(actor_id, "eng");
            assert_eq!(stored.revision, 2);
        }
        other => panic!("unexpected event {other:?}"),
    }
    // One protocol, one request, one transition.
    assert_eq!(portal.store().event_count().unwrap(), 3);
}

/// A refused write publishes nothing.
#[test]
fn refused_writes_are_silent() {
    let (mut portal, _clock) = portal();
    let request = portal.submit_request("u1", costing("Harbour")).unwrap();
    let rx = portal.subscribe();
    assert!(portal.complete_request(&request.id, "u1").is_err());
    assert!(portal.confirm_request(&request.id, "eng", " ").is_err());
    assert_eq!(rx.try_iter().count(), 0);
    assert_eq!(portal.store().event_count().unwrap(), 2);
}

#[test]
fn dropped_subscribers_are_pruned() {
    let mut bus = EventBus::new();
    let kept = bus.subscribe();
    let dropped = bus.subscribe();
    drop(dropped);
    assert_eq!(bus.subscriber_count(), 2);

    bus.publish(&PortalEvent::ProtocolDeleted {
        protocol_id: "dialux".into(),
    });
    assert_eq!(bus.subscriber_count(), 1);
    assert_eq!(kept.try_iter().count(), 1);
}

/// What a subscriber sees is what a later read from the store returns, even
/// when the clock carries sub-millisecond precision.
#[test]
fn published_request_matches_stored_request() {
    let (mut portal, clock) = portal();
    clock.advance(Duration::nanoseconds(123_456_789));
    let rx = portal.subscribe();

    let submitted = portal.submit_request("u1", costing("Precise")).unwrap();
    assert_eq!(submitted.created_at.timestamp_subsec_nanos(), 123_000_000);
    let stored = portal.store().get_request(&submitted.id).unwrap();
    assert_eq!(stored, submitted);
    match rx.try_recv().unwrap() {
        PortalEvent::RequestSubmitted { request } => assert_eq!(request, stored),
        other => panic!("unexpected event {other:?}"),
    }

    clock.advance(Duration::nanoseconds(987_654));
    let confirmed = portal.confirm_request(&submitted.id, "eng", "Quoted").unwrap();
    assert_eq!(portal.store().get_request(&submitted.id).unwrap(), confirmed);
}

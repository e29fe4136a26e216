//! Directory cache tests: TTL expiry, explicit invalidation and how
//! outages are (not) cached.

use chrono::{Duration, TimeZone, Utc};
use portal_core::{
    clock::ManualClock,
    directory::{CachedDirectory, Department, StaticDirectory, User, UserDirectory},
    error::{PortalError, PortalResult},
};
use std::cell::Cell;
use std::sync::Arc;

fn user(id: &str, department: &str) -> User {
    User {
        id: id.into(),
        name: id.into(),
        department: Department::parse(department),
        role: String::new(),
        position: String::new(),
        reference_id: String::new(),
    }
}

/// Counts calls and can be switched into an outage.
struct CountingDirectory {
    roster: StaticDirectory,
    lookups: Cell<usize>,
    lists: Cell<usize>,
    down: Cell<bool>,
}

impl CountingDirectory {
    fn new(users: Vec<User>) -> Self {
        Self {
            roster: StaticDirectory::from_users(users),
            lookups: Cell::new(0),
            lists: Cell::new(0),
            down: Cell::new(false),
        }
    }
}

impl UserDirectory for CountingDirectory {
    fn lookup(&self, id: &str) -> PortalResult<Option<User>> {
        self.lookups.set(self.lookups.get() + 1);
        if self.down.get() {
            return Err(PortalError::DirectoryUnavailable("timeout".into()));
        }
        self.roster.lookup(id)
    }

    fn list(&self) -> PortalResult<Vec<User>> {
        self.lists.set(self.lists.get() + 1);
        if self.down.get() {
            return Err(PortalError::DirectoryUnavailable("timeout".into()));
        }
        self.roster.list()
    }
}

fn cached() -> (CachedDirectory<CountingDirectory>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 9, 9, 12, 0, 0).unwrap()));
    let inner = CountingDirectory::new(vec![user("u1", "SALES"), user("eng", "ENGINEERING")]);
    let directory = CachedDirectory::new(inner, clock.clone(), Duration::seconds(60));
    (directory, clock)
}

#[test]
fn lookups_are_reused_within_ttl() {
    let (directory, clock) = cached();
    assert_eq!(directory.lookup("u1").unwrap().unwrap().id, "u1");
    clock.advance(Duration::seconds(59));
    assert_eq!(directory.lookup("u1").unwrap().unwrap().id, "u1");
    assert_eq!(directory.inner().lookups.get(), 1);

    clock.advance(Duration::seconds(1));
    directory.lookup("u1").unwrap();
    assert_eq!(directory.inner().lookups.get(), 2);
}

/// "No such user" is an answer and is cached like one.
#[test]
fn missing_users_are_cached() {
    let (directory, _clock) = cached();
    assert!(directory.lookup("ghost").unwrap().is_none());
    assert!(directory.lookup("ghost").unwrap().is_none());
    assert_eq!(directory.inner().lookups.get(), 1);
}

#[test]
fn invalidate_forces_a_fresh_read() {
    let (mut directory, _clock) = cached();
    assert_eq!(
        directory.lookup("u1").unwrap().unwrap().department,
        Department::Sales
    );
    directory.inner_mut().roster.insert(user("u1", "IT"));

    // Still the cached answer.
    assert_eq!(
        directory.lookup("u1").unwrap().unwrap().department,
        Department::Sales
    );
    directory.invalidate("u1");
    assert_eq!(directory.lookup("u1").unwrap().unwrap().department, Department::It);
    assert_eq!(directory.inner().lookups.get(), 2);
}

#[test]
fn roster_is_cached_and_cleared() {
    let (directory, clock) = cached();
    assert_eq!(directory.list().unwrap().len(), 2);
    assert_eq!(directory.list_department(&Department::Engineering).unwrap().len(), 1);
    assert_eq!(directory.inner().lists.get(), 1);

    directory.clear();
    directory.list().unwrap();
    assert_eq!(directory.inner().lists.get(), 2);

    clock.advance(Duration::minutes(5));
    directory.list().unwrap();
    assert_eq!(directory.inner().lists.get(), 3);
}

/// An outage is reported every time and never poisons the cache.
#[test]
fn failures_are_not_cached() {
    let (directory, _clock) = cached();
    directory.inner().down.set(true);
    assert!(directory.lookup("eng").is_err());
    assert!(directory.lookup("eng").is_err());
    assert_eq!(directory.inner().lookups.get(), 2);

    directory.inner().down.set(false);
    assert_eq!(
        directory.lookup("eng").unwrap().unwrap().department,
        Department::Engineering
    );
}

/// A cached answer outlives an outage until its TTL runs out.
#[test]
fn fresh_entries_survive_an_outage() {
    let (directory, clock) = cached();
    directory.lookup("eng").unwrap();
    directory.inner().down.set(true);
    assert!(directory.lookup("eng").unwrap().is_some());

    clock.advance(Duration::seconds(61));
    assert!(matches!(
        directory.lookup("eng"),
        Err(PortalError::DirectoryUnavailable(_))
    ));
}

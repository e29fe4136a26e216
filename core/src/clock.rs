//! Wall-clock source for every timestamp the core stamps.
//!
//! The portal and the directory cache share one `Arc<dyn Clock>` so tests
//! can drive TTL expiry and transition stamps from a `ManualClock`.
//!
//! RULE: every clock reads at millisecond precision, the precision the
//! store keeps. A value handed out by `now()` round-trips unchanged.

use crate::types::Timestamp;
use chrono::{Duration, SubsecRound, Utc};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Real time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().trunc_subsecs(3)
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward by `by`. Returns the new time.
    pub fn advance(&self, by: Duration) -> Timestamp {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
        *now
    }

    pub fn set(&self, to: Timestamp) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        let now = *self.now.lock().unwrap_or_else(|e| e.into_inner());
        now.trunc_subsecs(3)
    }
}

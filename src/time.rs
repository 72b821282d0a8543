//! Time sources.
//!
//! Every service takes a [`Clock`] so TTL expiry and receipt timestamps can
//! be driven deterministically in tests and simulations.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

/// Source of the current instant
pub trait Clock: Send + Sync {
    /// Current UTC instant
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by `chrono::Utc::now()`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    /// Start at a fixed instant
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// Start at the current wall-clock instant
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Jump to an instant
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.write() = instant;
    }

    /// Move forward (or backward, with a negative duration)
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

//! Injected clock abstraction.
//!
//! The freeze sweep fires on wall-clock minutes in each user's local
//! timezone, so production code reads time through a [`Clock`] and tests
//! substitute a [`FixedClock`] pinned to the instant under test.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

/// Source of "now" for time-driven code paths.
pub trait Clock: Send {
    /// Current instant in UTC.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to a settable instant.
///
/// Used by sweep tests to simulate a specific local time (e.g. 00:05 in a
/// user's timezone) instead of waiting for a real minute tick.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Move the clock to a new instant.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

impl Clock for std::sync::Arc<FixedClock> {
    fn now_utc(&self) -> DateTime<Utc> {
        self.as_ref().now_utc()
    }
}

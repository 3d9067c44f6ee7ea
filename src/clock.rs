//! Time source abstraction.
//!
//! Schedule arithmetic always goes through a `Clock` so tests can pin the
//! current instant instead of sleeping through real intervals.

use std::sync::Mutex;

use chrono::{DateTime, Local};

/// Supplies the current local, timezone-aware instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Manually advanced clock for tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Set the current instant.
    pub fn set(&self, now: DateTime<Local>) {
        *self.now.lock().unwrap() = now;
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap()
    }
}

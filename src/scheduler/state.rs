//! Persisted scheduler state.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// State tracked for the update scheduler, persisted across restarts.
///
/// `last_update` is only set after a pipeline run completes, so a crash
/// mid-run leaves the previous value in place and the run is retried rather
/// than skipped. `is_running` reflects the scheduler loop, not whether a
/// pipeline run is currently in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleState {
    pub last_update: Option<DateTime<Local>>,
    pub next_update: Option<DateTime<Local>>,
    pub is_running: bool,
}

impl ScheduleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed pipeline run.
    pub fn record_update(&mut self, at: DateTime<Local>) {
        self.last_update = Some(at);
    }

    pub fn set_next_update(&mut self, at: DateTime<Local>) {
        self.next_update = Some(at);
    }
}

/// Read-only snapshot returned by status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub last_update: Option<DateTime<Local>>,
    pub next_update: Option<DateTime<Local>>,
    pub update_days: Option<u32>,
    pub fixed_update_time: Option<String>,
}

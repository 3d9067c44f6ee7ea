//! Startup recovery for persisted schedule state.
//!
//! After a restart the persisted document may be stale: the trigger time may
//! have passed while the process was down, the running flag may still be set
//! from a crash, or the stored interval may no longer match the config. This
//! module detects those inconsistencies and repairs the state before the
//! scheduler loop starts, so a missed trigger re-anchors to a valid future
//! time instead of firing in a tight loop.

use chrono::{DateTime, Duration, Local};
use log::info;

use crate::config::SchedulingConfig;
use crate::scheduler::schedule::{FixedTime, compute_next_trigger};
use crate::scheduler::state::ScheduleState;

/// Validate schedule integrity. Returns a list of human-readable issues;
/// empty means the state is consistent.
pub fn validate_schedule_integrity(
    now: DateTime<Local>,
    state: &ScheduleState,
    config: &SchedulingConfig,
) -> Vec<String> {
    let mut issues = Vec::new();
    let interval = Duration::days(i64::from(config.update_days));

    if let Some(next) = state.next_update {
        if next <= now {
            issues.push(format!("next_update {next} is in the past"));
        }
        let max_future = now + interval * 2;
        if next > max_future {
            issues.push(format!(
                "next_update {next} is more than {} days in the future",
                config.update_days * 2
            ));
        }
    }

    if let (Some(last), Some(next)) = (state.last_update, state.next_update) {
        let actual = next - last;
        // Fixed-time scheduling can legitimately land up to a day off the
        // exact interval, in either direction.
        if (actual - interval).abs() > Duration::days(1) {
            issues.push(format!(
                "inconsistent interval: expected ~{} days, got {} days",
                config.update_days,
                actual.num_days()
            ));
        }
    }

    if state.is_running {
        issues.push("is_running still set from a previous process".to_string());
    }

    issues
}

/// Repair inconsistent state in place: recompute a trigger that is missing,
/// past, or earlier than the minimum gap from `last_update` allows, and
/// clear a stale running flag. `last_update` is never touched.
pub fn repair_schedule_state(
    now: DateTime<Local>,
    state: &mut ScheduleState,
    update_days: u32,
    fixed_time: FixedTime,
) {
    let interval = Duration::days(i64::from(update_days));
    // Fixed-time anchoring may land up to a day short of the exact interval.
    let tolerance = if fixed_time.is_disabled() {
        Duration::zero()
    } else {
        Duration::days(1)
    };
    let needs_reschedule = match state.next_update {
        Some(next) => {
            next <= now || state.last_update.is_some_and(|last| next < last + interval - tolerance)
        }
        None => true,
    };

    if needs_reschedule {
        let next = compute_next_trigger(now, update_days, fixed_time, state.last_update);
        info!("Repairing next_update: {:?} -> {}", state.next_update, next);
        state.set_next_update(next);
    }

    if state.is_running {
        info!("Clearing stale running flag");
        state.is_running = false;
    }
}

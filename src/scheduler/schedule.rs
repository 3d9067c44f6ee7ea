//! Next-trigger calculation.
//!
//! Pure scheduling arithmetic: given the update interval, the optional fixed
//! clock time, the current instant, and the last successful update, compute
//! when the next update must fire. Both the scheduler loop and display code
//! go through this module so previewed and actual trigger times agree.

use chrono::{DateTime, Duration, Local, LocalResult, NaiveDate, NaiveTime, TimeZone};

use crate::error::{GraphbotError, Result};

/// Sentinel for interval-only scheduling.
pub const FIXED_TIME_DISABLED: &str = "XX:XX";

/// Parsed form of the `fixed_update_time` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedTime {
    /// Interval-only mode: schedule purely by elapsed days.
    Disabled,
    /// Fire at this local clock time on qualifying days.
    At(NaiveTime),
}

impl FixedTime {
    /// Parse `"HH:MM"` (24h, zero-padded) or the `"XX:XX"` sentinel.
    pub fn parse(s: &str) -> Result<Self> {
        if s == FIXED_TIME_DISABLED {
            return Ok(Self::Disabled);
        }

        let invalid = || GraphbotError::InvalidConfig(format!("invalid fixed_update_time: {s:?} (expected HH:MM or XX:XX)"));

        let (hh, mm) = s.split_once(':').ok_or_else(invalid)?;
        if hh.len() != 2 || mm.len() != 2 {
            return Err(invalid());
        }
        let hour: u32 = hh.parse().map_err(|_| invalid())?;
        let minute: u32 = mm.parse().map_err(|_| invalid())?;

        NaiveTime::from_hms_opt(hour, minute, 0).map(Self::At).ok_or_else(invalid)
    }

    /// True for the `"XX:XX"` sentinel.
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }
}

/// Compute the next trigger instant.
///
/// Guarantees: the result is strictly after `now`, and when `last_update` is
/// present the gap from it is at least `update_days` days.
pub fn compute_next_trigger(
    now: DateTime<Local>,
    update_days: u32,
    fixed_time: FixedTime,
    last_update: Option<DateTime<Local>>,
) -> DateTime<Local> {
    let interval = Duration::days(i64::from(update_days));

    let fixed = match fixed_time {
        FixedTime::Disabled => return now + interval,
        FixedTime::At(t) => t,
    };

    match last_update {
        None => {
            if update_days == 1 {
                // First launch always waits a full day, even when the fixed
                // time has not passed yet today.
                at_local(now.date_naive() + Duration::days(1), fixed)
            } else {
                let floor = now + interval;
                let mut candidate = at_local(floor.date_naive(), fixed);
                if candidate < floor {
                    candidate = at_local(floor.date_naive() + Duration::days(1), fixed);
                }
                candidate
            }
        }
        Some(last) => {
            let mut candidate = at_local(now.date_naive(), fixed);
            if candidate <= now {
                candidate = at_local(now.date_naive() + Duration::days(1), fixed);
            }

            let min_next = last + interval;
            if candidate < min_next {
                candidate = at_local(min_next.date_naive(), fixed);
                if candidate < min_next {
                    candidate = at_local(min_next.date_naive() + Duration::days(1), fixed);
                }
            }
            candidate
        }
    }
}

/// Time remaining until the next trigger.
pub fn time_until_next_trigger(
    now: DateTime<Local>,
    update_days: u32,
    fixed_time: FixedTime,
    last_update: Option<DateTime<Local>>,
) -> Duration {
    compute_next_trigger(now, update_days, fixed_time, last_update) - now
}

/// Resolve a local date + clock time to an instant, handling DST gaps by
/// sliding forward to the first representable time.
fn at_local(date: NaiveDate, time: NaiveTime) -> DateTime<Local> {
    let mut naive = date.and_time(time);
    loop {
        match Local.from_local_datetime(&naive) {
            LocalResult::Single(dt) => return dt,
            LocalResult::Ambiguous(earliest, _) => return earliest,
            LocalResult::None => naive += Duration::minutes(30),
        }
    }
}

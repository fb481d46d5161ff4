//! Daily active-time aggregation.
//!
//! A day's summary is rebuilt from scratch by replaying that day's events
//! in time order; it is never patched incrementally. Re-running the
//! aggregation over the same events yields the same summary.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::event::{ActivityClass, Event};

const MICROS_PER_SECOND: i64 = 1_000_000;

/// Per-day activity summary, unique by `day`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummary {
    pub day: NaiveDate,

    /// Time of the first start-class event of the day
    pub first_login: Option<NaiveDateTime>,

    /// Time of the last interval close (or the day-end clip)
    pub last_logout: Option<NaiveDateTime>,

    pub total_active_seconds: u64,
}

impl DailySummary {
    /// A summary for a day with no activity.
    pub fn empty(day: NaiveDate) -> Self {
        Self {
            day,
            first_login: None,
            last_logout: None,
            total_active_seconds: 0,
        }
    }

    /// Active time in hours, for display.
    pub fn active_hours(&self) -> f64 {
        self.total_active_seconds as f64 / 3600.0
    }
}

/// First instant of `day`.
pub fn day_start(day: NaiveDate) -> NaiveDateTime {
    day.and_time(NaiveTime::default())
}

/// Last representable instant of `day` (23:59:59.999999).
pub fn day_end(day: NaiveDate) -> NaiveDateTime {
    day.and_hms_micro_opt(23, 59, 59, 999_999)
        .unwrap_or_else(|| day_start(day))
}

/// Parses a `YYYY-MM-DD` day.
pub fn parse_day(value: &str) -> DomainResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| DomainError::InvalidDay {
        value: value.to_string(),
    })
}

/// Aggregates one calendar day's events into a [`DailySummary`].
///
/// `events` must be in non-decreasing time order; this is assumed, not
/// checked. Start-class events open an interval (a second start while one
/// is open is ignored), end-class events close it and add its length.
/// An end-class event with nothing open is discarded. An interval still
/// open after the last event is clipped to the end of `day`.
pub fn aggregate(day: NaiveDate, events: &[Event]) -> DailySummary {
    let mut active_start: Option<NaiveDateTime> = None;
    let mut first_login: Option<NaiveDateTime> = None;
    let mut last_logout: Option<NaiveDateTime> = None;
    let mut total_micros: i64 = 0;

    for event in events {
        match event.kind.activity_class() {
            ActivityClass::Start => {
                if first_login.is_none() {
                    first_login = Some(event.time);
                }
                if active_start.is_none() {
                    active_start = Some(event.time);
                }
            }
            ActivityClass::End => {
                if let Some(start) = active_start.take() {
                    total_micros += positive_micros(start, event.time);
                    last_logout = Some(event.time);
                }
            }
            ActivityClass::Neutral => {}
        }
    }

    if let Some(start) = active_start {
        let clip = day_end(day);
        total_micros += positive_micros(start, clip);
        if last_logout.is_none() {
            last_logout = Some(clip);
        }
    }

    DailySummary {
        day,
        first_login,
        last_logout,
        total_active_seconds: round_to_seconds(total_micros),
    }
}

/// Length of `start..end` in microseconds, or 0 when the clock went backwards.
fn positive_micros(start: NaiveDateTime, end: NaiveDateTime) -> i64 {
    (end - start)
        .num_microseconds()
        .filter(|micros| *micros > 0)
        .unwrap_or(0)
}

fn round_to_seconds(micros: i64) -> u64 {
    let seconds = (micros + MICROS_PER_SECOND / 2) / MICROS_PER_SECOND;
    u64::try_from(seconds).unwrap_or(0)
}

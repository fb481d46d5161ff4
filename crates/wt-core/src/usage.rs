//! Application focus tracking.
//!
//! The foreground window title is polled; an application name is derived
//! from it and a sample is recorded only when that name changes.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Separators tried in order when deriving an app name from a title.
pub const APP_SEPARATORS: [&str; 2] = [" - ", ":"];

/// One application switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUsageSample {
    pub time: NaiveDateTime,
    pub app_name: String,
    pub window_title: String,
}

/// Derives an application name from a window title.
///
/// The first separator of [`APP_SEPARATORS`] present in the title wins and
/// the segment after its rightmost occurrence is taken. Without any
/// separator the whole title is used. Blank titles yield `None`.
pub fn extract_app_name(window_title: &str) -> Option<String> {
    let title = window_title.trim();
    if title.is_empty() {
        return None;
    }

    let name = APP_SEPARATORS
        .iter()
        .find_map(|sep| title.rsplit_once(sep))
        .map(|(_, tail)| tail.trim())
        .filter(|tail| !tail.is_empty())
        .unwrap_or(title);

    Some(name.to_string())
}

/// Edge detector over the derived application name.
///
/// Remembers the last recorded application; an unresolvable poll leaves
/// that memory untouched.
#[derive(Debug, Clone, Default)]
pub struct AppFocus {
    last_app: Option<String>,
}

impl AppFocus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_app(&self) -> Option<&str> {
        self.last_app.as_deref()
    }

    /// Feeds one poll result. Returns a sample when the app changed.
    pub fn observe(&mut self, title: Option<&str>, at: NaiveDateTime) -> Option<AppUsageSample> {
        let title = title?;
        let app_name = extract_app_name(title)?;

        if self.last_app.as_deref() == Some(app_name.as_str()) {
            return None;
        }

        self.last_app = Some(app_name.clone());
        Some(AppUsageSample {
            time: at,
            app_name,
            window_title: title.trim().to_string(),
        })
    }
}

/// Usage of one application on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppUsageTotal {
    pub day: NaiveDate,
    pub app_name: String,
    /// Number of times focus switched to this app
    pub switches: u32,
    pub duration_seconds: u64,
    /// Share of the whole window's duration, 0-100 with 2 decimals
    pub percentage: f64,
}

/// Turns time-ordered switch samples into per-(day, app) totals.
///
/// A sample lasts until the next one; the last sample lasts until `until`.
/// Each span is capped at `max_gap` so time away from the machine is not
/// credited to whatever app had focus last. Spans are credited to the day
/// the sample was taken. Results are ordered by day (newest first), then
/// duration (longest first), then name.
pub fn summarize_usage(
    samples: &[AppUsageSample],
    until: NaiveDateTime,
    max_gap: Duration,
) -> Vec<AppUsageTotal> {
    let mut totals: HashMap<(NaiveDate, &str), (u32, i64)> = HashMap::new();

    let ends = samples
        .iter()
        .skip(1)
        .map(|s| s.time)
        .chain(std::iter::once(until));

    for (sample, end) in samples.iter().zip(ends) {
        let span = (end - sample.time).clamp(Duration::zero(), max_gap);
        let entry = totals
            .entry((sample.time.date(), sample.app_name.as_str()))
            .or_insert((0, 0));
        entry.0 += 1;
        entry.1 += span.num_seconds();
    }

    let grand_total: i64 = totals.values().map(|(_, secs)| *secs).sum();
    let denominator = grand_total.max(1) as f64;

    let mut result: Vec<AppUsageTotal> = totals
        .into_iter()
        .map(|((day, app_name), (switches, secs))| AppUsageTotal {
            day,
            app_name: app_name.to_string(),
            switches,
            duration_seconds: u64::try_from(secs).unwrap_or(0),
            percentage: (secs as f64 / denominator * 10_000.0).round() / 100.0,
        })
        .collect();

    result.sort_by(|a, b| {
        b.day
            .cmp(&a.day)
            .then(b.duration_seconds.cmp(&a.duration_seconds))
            .then_with(|| a.app_name.cmp(&b.app_name))
    });
    result
}

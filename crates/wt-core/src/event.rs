//! Activity events and their classification.
//!
//! An [`Event`] is the unit of the append-only activity log. Its
//! [`EventKind`] decides how the daily aggregation treats it: start-class
//! kinds open an activity interval, end-class kinds close one, and
//! everything else is carried for diagnostics only.

use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Fixed-width local timestamp format used for storage.
///
/// Lexical order of formatted values equals chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Kind of a recorded activity event.
///
/// The serialized names are the ones written to the activity log. Legacy
/// spellings (`BOOT/RESUME`, `SCRIPT STOPPED MANUALLY`) are accepted on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Tracker started inside a user session
    #[serde(rename = "login")]
    Login,

    /// Session became locked
    #[serde(rename = "LOCKED")]
    Locked,

    /// Session became unlocked
    #[serde(rename = "UNLOCKED")]
    Unlocked,

    /// System suspend seen in the power history
    #[serde(rename = "SUSPEND")]
    Suspend,

    /// System shutdown seen in the power history
    #[serde(rename = "SHUTDOWN")]
    Shutdown,

    /// Boot or resume seen in the power history
    #[serde(rename = "BOOT_RESUME", alias = "BOOT/RESUME")]
    BootResume,

    /// A fault escaped the tracker loop
    #[serde(rename = "ERROR")]
    Error,

    /// Tracker was stopped by an interrupt
    #[serde(rename = "SCRIPT_STOPPED", alias = "SCRIPT STOPPED MANUALLY")]
    ScriptStopped,
}

/// How an event kind participates in activity intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityClass {
    /// Opens an activity interval (user became present)
    Start,
    /// Closes an open activity interval (user went away)
    End,
    /// Ignored by the aggregation
    Neutral,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 8] = [
        Self::Login,
        Self::Locked,
        Self::Unlocked,
        Self::Suspend,
        Self::Shutdown,
        Self::BootResume,
        Self::Error,
        Self::ScriptStopped,
    ];

    /// Kinds shown on the dashboard timeline.
    pub const TIMELINE: [EventKind; 5] = [
        Self::Locked,
        Self::Unlocked,
        Self::Suspend,
        Self::Shutdown,
        Self::BootResume,
    ];

    /// Returns the name written to the activity log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Locked => "LOCKED",
            Self::Unlocked => "UNLOCKED",
            Self::Suspend => "SUSPEND",
            Self::Shutdown => "SHUTDOWN",
            Self::BootResume => "BOOT_RESUME",
            Self::Error => "ERROR",
            Self::ScriptStopped => "SCRIPT_STOPPED",
        }
    }

    /// Returns the activity class used by the daily aggregation.
    pub fn activity_class(&self) -> ActivityClass {
        match self {
            Self::Login | Self::Unlocked => ActivityClass::Start,
            Self::Locked | Self::Suspend | Self::Shutdown => ActivityClass::End,
            Self::BootResume | Self::Error | Self::ScriptStopped => ActivityClass::Neutral,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        match normalized.as_str() {
            "LOGIN" => Ok(Self::Login),
            "LOCKED" => Ok(Self::Locked),
            "UNLOCKED" => Ok(Self::Unlocked),
            "SUSPEND" => Ok(Self::Suspend),
            "SHUTDOWN" => Ok(Self::Shutdown),
            "BOOT_RESUME" | "BOOT/RESUME" => Ok(Self::BootResume),
            "ERROR" => Ok(Self::Error),
            "SCRIPT_STOPPED" | "SCRIPT STOPPED MANUALLY" => Ok(Self::ScriptStopped),
            _ => Err(DomainError::UnknownEventKind(s.to_string())),
        }
    }
}

/// A single timestamped activity event.
///
/// `details` is free-form diagnostic text and is never parsed downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Local wall-clock time of emission
    pub time: NaiveDateTime,

    /// What happened
    #[serde(rename = "type")]
    pub kind: EventKind,

    /// Diagnostic detail (session id, raw history line, error text)
    #[serde(default)]
    pub details: String,
}

impl Event {
    /// Creates an event at the given time.
    pub fn new(kind: EventKind, time: NaiveDateTime, details: impl Into<String>) -> Self {
        Self {
            time,
            kind,
            details: details.into(),
        }
    }

    /// Returns the calendar day the event belongs to.
    pub fn day(&self) -> NaiveDate {
        self.time.date()
    }
}

/// Issues non-decreasing timestamps for one event stream.
///
/// If the wall clock jumps backwards, the stream keeps the last issued
/// time instead, so events stay in emission order for the aggregation.
#[derive(Debug, Clone, Default)]
pub struct EventClock {
    last: Option<NaiveDateTime>,
}

impl EventClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `now`, or the previously issued time if `now` is earlier.
    pub fn stamp(&mut self, now: NaiveDateTime) -> NaiveDateTime {
        let time = match self.last {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last = Some(time);
        time
    }

    /// Stamps the current local time.
    pub fn stamp_now(&mut self) -> NaiveDateTime {
        self.stamp(Local::now().naive_local())
    }
}

/// Formats a timestamp in [`TIMESTAMP_FORMAT`].
pub fn format_timestamp(time: &NaiveDateTime) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a stored timestamp.
///
/// Accepts the fixed-width storage format as well as values without
/// fractional seconds.
pub fn parse_timestamp(value: &str) -> DomainResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| DomainError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

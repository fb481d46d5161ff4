//! WT Core - Domain types for desktop activity tracking
//!
//! This crate holds the pure, I/O-free logic shared by the daemon (`wtd`)
//! and the dashboard protocol:
//! - `event` - typed, timestamped activity events and their activity class
//! - `session` - session identifiers and lock state
//! - `history` - classification and deduplication of system history lines
//! - `summary` - the daily active-time aggregation
//! - `usage` - application focus edge detection and usage totals

pub mod error;
pub mod event;
pub mod history;
pub mod session;
pub mod summary;
pub mod usage;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use event::{
    format_timestamp, parse_timestamp, ActivityClass, Event, EventClock, EventKind, TIMESTAMP_FORMAT,
};
pub use history::{classify, scan, HistoryEntry, HistoryKind, SeenHistorySet};
pub use session::{LockState, SessionId};
pub use summary::{aggregate, day_end, day_start, parse_day, DailySummary};
pub use usage::{extract_app_name, summarize_usage, AppFocus, AppUsageSample, AppUsageTotal};

//! Storage for activity events, daily summaries and app usage samples.
//!
//! All traits are synchronous and `Send + Sync`; implementations must accept
//! concurrent appends from several loops. A call may wait on the database
//! lock, so async code runs it through [`blocking`]. Appends are
//! best-effort: callers log a failed append and move on, nothing is
//! buffered for retry.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::{NaiveDate, NaiveDateTime};
use wt_core::{AppUsageSample, DailySummary, Event, EventKind};

use crate::error::StorageError;

/// Append-only activity log.
pub trait EventStore: Send + Sync {
    fn append(&self, event: &Event) -> Result<(), StorageError>;

    /// Events of one calendar day, oldest first.
    fn events_for_day(&self, day: NaiveDate) -> Result<Vec<Event>, StorageError>;

    /// Distinct days that have at least one event, oldest first.
    fn days_with_events(&self) -> Result<Vec<NaiveDate>, StorageError>;

    /// Most recent events of the given kinds, newest first.
    fn recent_events(&self, kinds: &[EventKind], limit: usize) -> Result<Vec<Event>, StorageError>;
}

/// Per-day summaries, unique by day.
pub trait SummaryStore: Send + Sync {
    /// Inserts or replaces the summary for `summary.day`.
    fn upsert_summary(&self, summary: &DailySummary) -> Result<(), StorageError>;

    /// Most recent summaries, newest day first.
    fn recent_summaries(&self, limit: usize) -> Result<Vec<DailySummary>, StorageError>;
}

/// Application switch samples.
pub trait UsageStore: Send + Sync {
    fn append_usage(&self, sample: &AppUsageSample) -> Result<(), StorageError>;

    /// Samples taken at or after `since`, oldest first.
    fn usage_since(&self, since: NaiveDateTime) -> Result<Vec<AppUsageSample>, StorageError>;
}

/// Runs a synchronous store call on tokio's blocking thread pool.
pub async fn blocking<T, F>(call: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
}

/// Everything the daemon persists.
pub trait Store: EventStore + SummaryStore + UsageStore {}

impl<T: EventStore + SummaryStore + UsageStore> Store for T {}

//! In-memory store.
//!
//! Used by tests and when embedding the tracker without a database. An
//! outage can be simulated with [`MemoryStore::set_available`], after which
//! every call fails with [`StorageError::Unavailable`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{NaiveDate, NaiveDateTime};
use wt_core::{AppUsageSample, DailySummary, Event, EventKind};

use super::{EventStore, SummaryStore, UsageStore};
use crate::error::StorageError;

#[derive(Debug, Default)]
pub struct MemoryStore {
    events: Mutex<Vec<Event>>,
    summaries: Mutex<BTreeMap<NaiveDate, DailySummary>>,
    usage: Mutex<Vec<AppUsageSample>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggles the simulated outage.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Every event ever appended, in append order.
    pub fn all_events(&self) -> Vec<Event> {
        lock(&self.events).map(|e| e.clone()).unwrap_or_default()
    }

    /// Every stored summary, oldest day first.
    pub fn all_summaries(&self) -> Vec<DailySummary> {
        lock(&self.summaries)
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default()
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable)
        } else {
            Ok(())
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|_| StorageError::Query("store lock poisoned".to_string()))
}

impl EventStore for MemoryStore {
    fn append(&self, event: &Event) -> Result<(), StorageError> {
        self.check()?;
        lock(&self.events)?.push(event.clone());
        Ok(())
    }

    fn events_for_day(&self, day: NaiveDate) -> Result<Vec<Event>, StorageError> {
        self.check()?;
        let mut events: Vec<Event> = lock(&self.events)?
            .iter()
            .filter(|e| e.day() == day)
            .cloned()
            .collect();
        // Stable, so equal timestamps keep append order
        events.sort_by_key(|e| e.time);
        Ok(events)
    }

    fn days_with_events(&self) -> Result<Vec<NaiveDate>, StorageError> {
        self.check()?;
        let mut days: Vec<NaiveDate> = lock(&self.events)?.iter().map(Event::day).collect();
        days.sort();
        days.dedup();
        Ok(days)
    }

    fn recent_events(&self, kinds: &[EventKind], limit: usize) -> Result<Vec<Event>, StorageError> {
        self.check()?;
        let mut events: Vec<Event> = lock(&self.events)?
            .iter()
            .filter(|e| kinds.contains(&e.kind))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.time);
        events.reverse();
        events.truncate(limit);
        Ok(events)
    }
}

impl SummaryStore for MemoryStore {
    fn upsert_summary(&self, summary: &DailySummary) -> Result<(), StorageError> {
        self.check()?;
        lock(&self.summaries)?.insert(summary.day, summary.clone());
        Ok(())
    }

    fn recent_summaries(&self, limit: usize) -> Result<Vec<DailySummary>, StorageError> {
        self.check()?;
        Ok(lock(&self.summaries)?
            .values()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

impl UsageStore for MemoryStore {
    fn append_usage(&self, sample: &AppUsageSample) -> Result<(), StorageError> {
        self.check()?;
        lock(&self.usage)?.push(sample.clone());
        Ok(())
    }

    fn usage_since(&self, since: NaiveDateTime) -> Result<Vec<AppUsageSample>, StorageError> {
        self.check()?;
        let mut samples: Vec<AppUsageSample> = lock(&self.usage)?
            .iter()
            .filter(|s| s.time >= since)
            .cloned()
            .collect();
        samples.sort_by_key(|s| s.time);
        Ok(samples)
    }
}

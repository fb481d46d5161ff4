//! Daily aggregation runs.
//!
//! A run reads one closed, time-ordered snapshot of a day's events,
//! aggregates it and upserts the result. Runs for the same day must not
//! overlap; the periodic task runs them one after another.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wt_core::{aggregate, DailySummary, Event};

use crate::error::StorageError;
use crate::store::{blocking, EventStore, SummaryStore};

/// Recomputes and upserts the summary of `day`.
pub fn summarize_day<S>(store: &S, day: NaiveDate) -> Result<DailySummary, StorageError>
where
    S: EventStore + SummaryStore + ?Sized,
{
    let events = store.events_for_day(day)?;
    upsert_aggregate(store, day, &events)
}

/// Like [`summarize_day`], but a day without events gets no row.
pub fn refresh_day<S>(store: &S, day: NaiveDate) -> Result<Option<DailySummary>, StorageError>
where
    S: EventStore + SummaryStore + ?Sized,
{
    let events = store.events_for_day(day)?;
    if events.is_empty() {
        debug!(%day, "No events, summary skipped");
        return Ok(None);
    }
    upsert_aggregate(store, day, &events).map(Some)
}

fn upsert_aggregate<S>(store: &S, day: NaiveDate, events: &[Event]) -> Result<DailySummary, StorageError>
where
    S: SummaryStore + ?Sized,
{
    let summary = aggregate(day, events);
    store.upsert_summary(&summary)?;

    debug!(
        %day,
        events = events.len(),
        total_active_seconds = summary.total_active_seconds,
        "Summarized day"
    );
    Ok(summary)
}

/// Recomputes every day that has events, oldest first.
///
/// A failure on one day is logged and the remaining days still run.
pub fn summarize_all<S>(store: &S) -> Result<Vec<DailySummary>, StorageError>
where
    S: EventStore + SummaryStore + ?Sized,
{
    let days = store.days_with_events()?;
    let mut summaries = Vec::with_capacity(days.len());

    for day in days {
        match summarize_day(store, day) {
            Ok(summary) => summaries.push(summary),
            Err(e) => warn!(%day, error = %e, "Failed to summarize day"),
        }
    }

    Ok(summaries)
}

/// Logs one line per summary.
pub fn log_summaries(summaries: &[DailySummary]) {
    for s in summaries {
        info!(
            day = %s.day,
            first_login = ?s.first_login,
            last_logout = ?s.last_logout,
            active_hours = format!("{:.2}", s.active_hours()),
            "Daily summary"
        );
    }
}

/// Re-aggregates yesterday and today every `interval` until cancelled.
///
/// Yesterday is included so an interval left open at midnight gets its
/// final clipped total. Days without events are skipped. Store calls run
/// on the blocking pool.
pub fn spawn_summary_task<S>(
    store: Arc<S>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    S: EventStore + SummaryStore + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Summary task shutting down");
                    break;
                }

                _ = ticker.tick() => {
                    let today = Local::now().date_naive();
                    for day in [today.pred_opt(), Some(today)].into_iter().flatten() {
                        let store = Arc::clone(&store);
                        if let Err(e) = blocking(move || refresh_day(store.as_ref(), day)).await {
                            warn!(%day, error = %e, "Periodic summary failed");
                        }
                    }
                }
            }
        }
    })
}

//! Dashboard read API.
//!
//! Every read degrades to an empty list on a storage failure; the error is
//! logged and never reaches the dashboard client. Store queries run on the
//! blocking pool so a locked database never stalls the socket server.

use std::sync::Arc;

use chrono::{Days, Local, NaiveDateTime};
use tracing::warn;

use wt_core::{day_start, summarize_usage, AppUsageTotal, DailySummary, Event, EventKind};
use wt_protocol::DashboardSnapshot;

use crate::config::DashboardConfig;
use crate::error::StorageError;
use crate::store::{blocking, Store};

#[derive(Clone)]
pub struct DashboardReader {
    store: Arc<dyn Store>,
    config: DashboardConfig,
    max_sample_gap: chrono::Duration,
}

impl DashboardReader {
    pub fn new(store: Arc<dyn Store>, config: DashboardConfig, max_sample_gap: chrono::Duration) -> Self {
        Self {
            store,
            config,
            max_sample_gap,
        }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Most recent daily summaries, newest first.
    pub async fn daily_summaries(&self, limit: Option<usize>) -> Vec<DailySummary> {
        let limit = limit.unwrap_or(self.config.summary_days);
        let store = Arc::clone(&self.store);
        degrade("daily summaries", blocking(move || store.recent_summaries(limit)).await)
    }

    /// Most recent timeline events, newest first.
    pub async fn recent_events(&self, limit: Option<usize>) -> Vec<Event> {
        let limit = limit.unwrap_or(self.config.recent_events);
        let store = Arc::clone(&self.store);
        degrade(
            "recent events",
            blocking(move || store.recent_events(&EventKind::TIMELINE, limit)).await,
        )
    }

    /// Per-(day, app) usage over the trailing `days` calendar days, today included.
    pub async fn app_usage(&self, days: Option<u32>) -> Vec<AppUsageTotal> {
        self.app_usage_at(days.unwrap_or(self.config.usage_days), Local::now().naive_local())
            .await
    }

    pub async fn app_usage_at(&self, days: u32, now: NaiveDateTime) -> Vec<AppUsageTotal> {
        let back = u64::from(days.max(1) - 1);
        let first_day = now
            .date()
            .checked_sub_days(Days::new(back))
            .unwrap_or(now.date());

        let store = Arc::clone(&self.store);
        let since = day_start(first_day);
        let samples = degrade("app usage", blocking(move || store.usage_since(since)).await);
        summarize_usage(&samples, now, self.max_sample_gap)
    }

    /// The three result sets pushed to subscribers; app usage is today's top apps.
    pub async fn snapshot(&self) -> DashboardSnapshot {
        self.snapshot_at(Local::now().naive_local()).await
    }

    pub async fn snapshot_at(&self, now: NaiveDateTime) -> DashboardSnapshot {
        let mut app_usage = self.app_usage_at(1, now).await;
        app_usage.truncate(self.config.top_apps);

        DashboardSnapshot {
            daily_summaries: self.daily_summaries(None).await,
            recent_events: self.recent_events(None).await,
            app_usage,
        }
    }
}

fn degrade<T>(what: &str, result: Result<Vec<T>, StorageError>) -> Vec<T> {
    result.unwrap_or_else(|e| {
        warn!(query = what, error = %e, "Dashboard read failed, returning empty result");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EventStore, MemoryStore, SummaryStore, UsageStore};
    use chrono::NaiveDate;
    use wt_core::AppUsageSample;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn usage(store: &MemoryStore, time: NaiveDateTime, app: &str) {
        store
            .append_usage(&AppUsageSample {
                time,
                app_name: app.to_string(),
                window_title: app.to_string(),
            })
            .unwrap();
    }

    fn reader(store: Arc<MemoryStore>, top_apps: usize) -> DashboardReader {
        let config = DashboardConfig {
            top_apps,
            ..DashboardConfig::default()
        };
        DashboardReader::new(store, config, chrono::Duration::minutes(30))
    }

    #[tokio::test]
    async fn test_recent_events_only_timeline_kinds() {
        let store = Arc::new(MemoryStore::new());
        store.append(&Event::new(EventKind::Login, at(4, 8, 0), "")).unwrap();
        store.append(&Event::new(EventKind::Unlocked, at(4, 9, 0), "")).unwrap();
        store.append(&Event::new(EventKind::ScriptStopped, at(4, 10, 0), "")).unwrap();

        let events = reader(Arc::clone(&store), 10).recent_events(None).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Unlocked);
    }

    #[tokio::test]
    async fn test_app_usage_window() {
        let store = Arc::new(MemoryStore::new());
        usage(&store, at(1, 9, 0), "Old");
        usage(&store, at(3, 9, 0), "Terminal");
        usage(&store, at(4, 9, 0), "Firefox");

        let reader = reader(Arc::clone(&store), 10);
        let two_days = reader.app_usage_at(2, at(4, 9, 10)).await;
        let names: Vec<&str> = two_days.iter().map(|u| u.app_name.as_str()).collect();
        assert_eq!(names, vec!["Firefox", "Terminal"]);

        let today = reader.app_usage_at(1, at(4, 9, 10)).await;
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].duration_seconds, 600);
        assert!((today[0].percentage - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_snapshot_limits_top_apps() {
        let store = Arc::new(MemoryStore::new());
        usage(&store, at(4, 9, 0), "A");
        usage(&store, at(4, 9, 20), "B");
        usage(&store, at(4, 9, 30), "C");
        store.upsert_summary(&DailySummary::empty(at(4, 0, 0).date())).unwrap();

        let snapshot = reader(Arc::clone(&store), 2).snapshot_at(at(4, 9, 35)).await;
        let names: Vec<&str> = snapshot.app_usage.iter().map(|u| u.app_name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(snapshot.daily_summaries.len(), 1);
    }

    #[tokio::test]
    async fn test_outage_degrades_to_empty() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_summary(&DailySummary::empty(at(4, 0, 0).date())).unwrap();
        store.set_available(false);

        let reader = reader(Arc::clone(&store), 10);
        assert!(reader.daily_summaries(Some(5)).await.is_empty());
        assert_eq!(reader.snapshot_at(at(4, 12, 0)).await, DashboardSnapshot::default());
    }
}

//! Application focus tracker.
//!
//! Polls the foreground window title and records a usage sample whenever
//! the derived application changes.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wt_core::{AppFocus, AppUsageSample, EventClock};

use crate::source::WindowSource;
use crate::store::{blocking, UsageStore};

pub struct FocusTracker {
    source: Arc<dyn WindowSource>,
    store: Arc<dyn UsageStore>,
    focus: AppFocus,
    clock: EventClock,
    poll_interval: Duration,
}

impl FocusTracker {
    pub fn new(source: Arc<dyn WindowSource>, store: Arc<dyn UsageStore>, poll_interval: Duration) -> Self {
        Self {
            source,
            store,
            focus: AppFocus::new(),
            clock: EventClock::new(),
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Polls once. Returns the sample if the focused app changed.
    pub async fn poll_once(&mut self) -> Option<AppUsageSample> {
        let title = match self.source.foreground_title().await {
            Ok(title) => title,
            Err(e) => {
                debug!(error = %e, "Failed to query foreground window");
                None
            }
        };

        let sample = self.focus.observe(title.as_deref(), self.clock.stamp_now())?;
        info!(app = %sample.app_name, title = %sample.window_title, "App switched");

        let store = Arc::clone(&self.store);
        let record = sample.clone();
        if let Err(e) = blocking(move || store.append_usage(&record)).await {
            warn!(app = %sample.app_name, error = %e, "Failed to store app usage");
        }
        Some(sample)
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Focus tracker shutting down");
                    break;
                }

                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }
    }
}

//! System-history scanner.
//!
//! Reads the rolling power history and hands it to [`wt_core::scan`]. The
//! seen-set is owned by the caller and threaded through every call.

use std::sync::Arc;

use tracing::{debug, warn};
use wt_core::{scan, HistoryEntry, SeenHistorySet};

use crate::source::HistorySource;

#[derive(Clone)]
pub struct HistoryScanner {
    source: Arc<dyn HistorySource>,
    max_lines: usize,
}

impl HistoryScanner {
    pub fn new(source: Arc<dyn HistorySource>, max_lines: usize) -> Self {
        Self { source, max_lines }
    }

    /// Marks every line currently in the window as seen, classified or not.
    ///
    /// Returns the number of lines read. A source failure leaves `seen`
    /// untouched.
    pub async fn prime(&self, seen: &mut SeenHistorySet) -> usize {
        match self.source.rolling_history(self.max_lines).await {
            Ok(lines) => {
                let count = lines.len();
                seen.prime(lines);
                debug!(lines = count, "Primed history seen-set");
                count
            }
            Err(e) => {
                warn!(error = %e, "Failed to read history for priming");
                0
            }
        }
    }

    /// Scans the current window. A source failure yields no entries.
    pub async fn scan(&self, seen: SeenHistorySet) -> (Vec<HistoryEntry>, SeenHistorySet) {
        match self.source.rolling_history(self.max_lines).await {
            Ok(lines) => scan(seen, &lines),
            Err(e) => {
                warn!(error = %e, "Failed to read history");
                (Vec::new(), seen)
            }
        }
    }
}

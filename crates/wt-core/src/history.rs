//! System power history classification and deduplication.
//!
//! The history source (e.g. `last -x`) is a rolling window of text lines
//! with no stable row identifier: entries shift, age out, and may be
//! reordered between reads. The exact line text is therefore the dedup
//! key. Lines carry a timestamp in practice, so a verbatim repeat of a
//! genuinely new event is not expected.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::EventKind;

/// Power-history family a line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Suspend,
    Shutdown,
    Boot,
}

/// Keyword families in priority order. A line matching several families
/// belongs to the first one listed.
const FAMILIES: [(HistoryKind, &[&str]); 3] = [
    (
        HistoryKind::Suspend,
        &["suspend", "sleep", "suspended", "systemd-suspend"],
    ),
    (
        HistoryKind::Shutdown,
        &["shutdown", "poweroff", "system-down"],
    ),
    (HistoryKind::Boot, &["reboot", "system boot"]),
];

impl HistoryKind {
    /// Event kind recorded for a line of this family.
    pub fn event_kind(&self) -> EventKind {
        match self {
            Self::Suspend => EventKind::Suspend,
            Self::Shutdown => EventKind::Shutdown,
            Self::Boot => EventKind::BootResume,
        }
    }
}

impl fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Suspend => write!(f, "suspend"),
            Self::Shutdown => write!(f, "shutdown"),
            Self::Boot => write!(f, "boot"),
        }
    }
}

/// Classifies a history line by case-insensitive keyword match.
///
/// Returns `None` for lines that match no family.
pub fn classify(line: &str) -> Option<HistoryKind> {
    let lower = line.to_lowercase();
    FAMILIES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(kind, _)| *kind)
}

/// Set of raw history lines that were already accounted for.
///
/// Unbounded by default: it grows with every distinct line observed over
/// the process lifetime. With a cap, the oldest inserted line is evicted
/// once the cap is exceeded; an evicted line that is still inside the
/// rolling window would then be reported again.
#[derive(Debug, Clone, Default)]
pub struct SeenHistorySet {
    lines: HashSet<String>,
    /// Insertion order, only tracked when `cap` is set
    order: VecDeque<String>,
    cap: Option<usize>,
}

impl SeenHistorySet {
    /// Creates an unbounded set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set that keeps at most `cap` lines (`cap == 0` means unbounded).
    pub fn bounded(cap: usize) -> Self {
        Self {
            cap: (cap > 0).then_some(cap),
            ..Self::default()
        }
    }

    pub fn contains(&self, line: &str) -> bool {
        self.lines.contains(line)
    }

    /// Inserts a line. Returns false if it was already present.
    pub fn insert(&mut self, line: impl Into<String>) -> bool {
        let line = line.into();
        if self.lines.contains(&line) {
            return false;
        }

        if let Some(cap) = self.cap {
            self.order.push_back(line.clone());
            while self.order.len() > cap {
                if let Some(oldest) = self.order.pop_front() {
                    self.lines.remove(&oldest);
                }
            }
        }

        self.lines.insert(line);
        true
    }

    /// Marks every line as seen without classifying it.
    ///
    /// Used at startup so history predating the tracker is never reported.
    pub fn prime<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for line in lines {
            self.insert(line);
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// A newly observed, classified history line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub kind: HistoryKind,
    pub line: String,
}

/// Scans one snapshot of the rolling history window.
///
/// Returns the classified lines not present in `seen`, in window order,
/// together with the updated set. Lines matching no family are neither
/// returned nor recorded. A line repeated within the same window is
/// reported once.
pub fn scan(mut seen: SeenHistorySet, window: &[String]) -> (Vec<HistoryEntry>, SeenHistorySet) {
    let mut entries = Vec::new();

    for line in window {
        if seen.contains(line) {
            continue;
        }
        if let Some(kind) = classify(line) {
            seen.insert(line.clone());
            entries.push(HistoryEntry {
                kind,
                line: line.clone(),
            });
        }
    }

    (entries, seen)
}

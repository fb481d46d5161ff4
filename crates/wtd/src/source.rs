//! Signal source interfaces.
//!
//! Each trait wraps one OS query. Implementations hold no detection state;
//! edge detection and dedup live in the router, scanner and focus tracker.
//! A returned [`SourceError`] is never fatal: callers treat it as "unknown"
//! for the current poll.

use async_trait::async_trait;
use wt_core::{LockState, SessionId};

use crate::error::SourceError;

/// Session manager queries.
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// Identifier of the current user's session, if one exists.
    async fn current_session(&self) -> Result<Option<SessionId>, SourceError>;

    /// Lock hint of `session`. `Ok(None)` means the hint was unreadable.
    async fn locked_hint(&self, session: &SessionId) -> Result<Option<LockState>, SourceError>;
}

/// Rolling system power history (newest lines first).
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn rolling_history(&self, max_lines: usize) -> Result<Vec<String>, SourceError>;
}

/// Foreground window queries.
#[async_trait]
pub trait WindowSource: Send + Sync {
    /// Title of the focused window, or `None` when nothing has focus.
    async fn foreground_title(&self) -> Result<Option<String>, SourceError>;
}

//! Lock-state poller.
//!
//! A stateless query wrapper around a [`SessionSource`]. Any source failure
//! is logged and reported as "unknown" (`None`); edge detection happens in
//! the router.

use std::sync::Arc;

use tracing::{debug, warn};
use wt_core::{LockState, SessionId};

use crate::source::SessionSource;

#[derive(Clone)]
pub struct LockPoller {
    source: Arc<dyn SessionSource>,
}

impl LockPoller {
    pub fn new(source: Arc<dyn SessionSource>) -> Self {
        Self { source }
    }

    /// Current session id, or `None` when absent, empty or unreadable.
    pub async fn session(&self) -> Option<SessionId> {
        match self.source.current_session().await {
            Ok(Some(id)) if !id.is_empty() => Some(id),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Failed to query session id");
                None
            }
        }
    }

    /// Lock state of `session`, or `None` when unknown.
    pub async fn poll(&self, session: Option<&SessionId>) -> Option<LockState> {
        let session = session?;
        match self.source.locked_hint(session).await {
            Ok(state) => {
                if state.is_none() {
                    debug!(session = %session, "Lock hint unreadable");
                }
                state
            }
            Err(e) => {
                warn!(session = %session, error = %e, "Failed to query lock state");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use async_trait::async_trait;

    struct Fixed {
        session: Result<Option<SessionId>, SourceError>,
        hint: Result<Option<LockState>, SourceError>,
    }

    #[async_trait]
    impl SessionSource for Fixed {
        async fn current_session(&self) -> Result<Option<SessionId>, SourceError> {
            self.session.clone()
        }

        async fn locked_hint(&self, _: &SessionId) -> Result<Option<LockState>, SourceError> {
            self.hint.clone()
        }
    }

    fn failed() -> SourceError {
        SourceError::Failed {
            command: "loginctl".to_string(),
            status: "exit status: 1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_poll_maps_errors_to_unknown() {
        let poller = LockPoller::new(Arc::new(Fixed {
            session: Err(failed()),
            hint: Err(failed()),
        }));
        let id = SessionId::new("2");

        assert_eq!(poller.session().await, None);
        assert_eq!(poller.poll(Some(&id)).await, None);
    }

    #[tokio::test]
    async fn test_poll_passes_state_through() {
        let poller = LockPoller::new(Arc::new(Fixed {
            session: Ok(Some(SessionId::new("2"))),
            hint: Ok(Some(LockState::Locked)),
        }));
        let id = poller.session().await;

        assert_eq!(id, Some(SessionId::new("2")));
        assert_eq!(poller.poll(id.as_ref()).await, Some(LockState::Locked));
        assert_eq!(poller.poll(None).await, None);
    }

    #[tokio::test]
    async fn test_empty_session_id_is_absent() {
        let poller = LockPoller::new(Arc::new(Fixed {
            session: Ok(Some(SessionId::new("  "))),
            hint: Ok(None),
        }));
        assert_eq!(poller.session().await, None);
    }
}

//! Activity event router.
//!
//! One control loop polls the lock state and the power history, turns
//! changes into events and appends them to the event store.
//!
//! ```text
//!   start ──▶ prime seen-set ──▶ login ──▶ initial LOCKED/UNLOCKED
//!                                               │
//!          ┌────────────────────────────────────┘
//!          ▼
//!   ┌─────────────┐  rebind session (log only)
//!   │ poll_cycle  │  lock state changed?  ──▶ LOCKED / UNLOCKED
//!   │             │  new history lines?   ──▶ SUSPEND / SHUTDOWN / BOOT_RESUME
//!   └──────┬──────┘
//!          │ every poll interval, until cancelled
//!          ▼
//!    SCRIPT_STOPPED
//! ```
//!
//! All loop state lives in [`RouterState`], owned by the loop and threaded
//! through [`ActivityRouter::poll_cycle`]. Unknown lock states and source
//! failures never produce events and never overwrite the last known state.

use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::NaiveDateTime;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use wt_core::{Event, EventClock, EventKind, LockState, SeenHistorySet, SessionId};

use crate::poller::LockPoller;
use crate::scanner::HistoryScanner;
use crate::store::{blocking, EventStore};

/// A fault that escaped the router loop.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("router loop panicked: {0}")]
    Panicked(String),

    #[error("router task was aborted: {0}")]
    Aborted(String),
}

/// Session binding and last known lock state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub session_id: Option<SessionId>,
    /// `None` until a lock state has been observed
    pub last_locked: Option<LockState>,
}

/// Everything the router loop carries from one cycle to the next.
#[derive(Debug, Clone, Default)]
pub struct RouterState {
    pub session: SessionState,
    pub seen: SeenHistorySet,
}

pub struct ActivityRouter {
    poller: LockPoller,
    scanner: HistoryScanner,
    store: Arc<dyn EventStore>,
    /// Shared with the crash handler in [`spawn_router`]
    clock: Arc<Mutex<EventClock>>,
    poll_interval: Duration,
    seen_history_cap: usize,
}

impl ActivityRouter {
    pub fn new(
        poller: LockPoller,
        scanner: HistoryScanner,
        store: Arc<dyn EventStore>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            poller,
            scanner,
            store,
            clock: Arc::new(Mutex::new(EventClock::new())),
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            seen_history_cap: 0,
        }
    }

    /// Bounds the seen-history set (0 keeps it unbounded).
    pub fn with_seen_history_cap(mut self, cap: usize) -> Self {
        self.seen_history_cap = cap;
        self
    }

    /// Stamps, logs and appends one event.
    ///
    /// A failed append is logged and dropped.
    pub async fn emit(&mut self, kind: EventKind, details: impl Into<String>) -> Event {
        let event = Event::new(kind, stamp_now(&self.clock), details);
        info!(kind = %event.kind, details = %event.details, "EVENT");

        append_event(&self.store, &event).await;
        event
    }

    /// Resolves the initial state and emits the startup events.
    pub async fn start(&mut self) -> RouterState {
        let mut seen = SeenHistorySet::bounded(self.seen_history_cap);
        self.scanner.prime(&mut seen).await;

        let session_id = self.poller.session().await;
        let label = match &session_id {
            Some(id) => id.to_string(),
            None => {
                warn!("No session found for the current user, lock detection waits for one");
                "none".to_string()
            }
        };
        self.emit(EventKind::Login, format!("script_start (session={label})"))
            .await;

        let mut session = SessionState {
            session_id,
            last_locked: None,
        };
        if let Some(state) = self.poller.poll(session.session_id.as_ref()).await {
            self.emit(state.event_kind(), format!("initial state (session={label})"))
                .await;
            session.last_locked = Some(state);
        }

        RouterState { session, seen }
    }

    /// Runs one detection cycle.
    pub async fn poll_cycle(&mut self, state: RouterState) -> RouterState {
        let RouterState { mut session, seen } = state;

        if let Some(current) = self.poller.session().await {
            if session.session_id.as_ref() != Some(&current) {
                info!(
                    old = ?session.session_id.as_ref().map(SessionId::as_str),
                    new = %current,
                    "Session changed, rebinding"
                );
                session.session_id = Some(current);
            }
        }

        if let Some(observed) = self.poller.poll(session.session_id.as_ref()).await {
            if session.last_locked != Some(observed) {
                let label = session
                    .session_id
                    .as_ref()
                    .map(SessionId::to_string)
                    .unwrap_or_default();
                self.emit(observed.event_kind(), format!("session={label}"))
                    .await;
                session.last_locked = Some(observed);
            }
        }

        let (entries, seen) = self.scanner.scan(seen).await;
        for entry in entries {
            debug!(family = %entry.kind, line = %entry.line, "New history line");
            self.emit(entry.kind.event_kind(), entry.line).await;
        }

        RouterState { session, seen }
    }

    /// Runs until `cancel` fires, then emits `SCRIPT_STOPPED`.
    ///
    /// Cancellation is checked between cycles only; a cycle in progress
    /// always completes.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut state = self.start().await;

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Router shutdown requested");
                    break;
                }

                _ = ticker.tick() => {
                    state = self.poll_cycle(state).await;
                }
            }
        }

        self.emit(EventKind::ScriptStopped, "stopped by signal").await;
        info!(seen_lines = state.seen.len(), "Router stopped");
    }
}

/// Spawns the router loop.
///
/// The returned handle resolves once the loop ends. A panic inside the loop
/// is recorded as an `ERROR` event carrying the panic message and returned
/// as [`RouterError::Panicked`]. The event is stamped by the router's clock,
/// so it never sorts before what the loop already recorded.
pub fn spawn_router(router: ActivityRouter, cancel: CancellationToken) -> JoinHandle<Result<(), RouterError>> {
    let store = Arc::clone(&router.store);
    let clock = Arc::clone(&router.clock);
    let inner = tokio::spawn(router.run(cancel));

    tokio::spawn(async move {
        match inner.await {
            Ok(()) => Ok(()),
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                error!(error = %message, "Router loop crashed");

                let event = Event::new(EventKind::Error, stamp_now(&clock), message.clone());
                append_event(&store, &event).await;
                Err(RouterError::Panicked(message))
            }
            Err(e) => Err(RouterError::Aborted(e.to_string())),
        }
    })
}

fn stamp_now(clock: &Mutex<EventClock>) -> NaiveDateTime {
    clock
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .stamp_now()
}

/// Appends on the blocking pool; a failure is logged and the event dropped.
async fn append_event(store: &Arc<dyn EventStore>, event: &Event) {
    let store = Arc::clone(store);
    let record = event.clone();
    if let Err(e) = blocking(move || store.append(&record)).await {
        warn!(kind = %event.kind, error = %e, "Failed to store event");
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::source::{HistorySource, SessionSource};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays queued answers; the last one repeats once the queue drains.
    struct Script<T: Clone> {
        queue: Mutex<VecDeque<T>>,
        last: Mutex<Option<T>>,
    }

    impl<T: Clone> Script<T> {
        fn new(items: Vec<T>) -> Self {
            Self {
                queue: Mutex::new(items.into()),
                last: Mutex::new(None),
            }
        }

        fn next(&self) -> Option<T> {
            let next = self.queue.lock().unwrap().pop_front();
            let mut last = self.last.lock().unwrap();
            if let Some(item) = next {
                *last = Some(item);
            }
            last.clone()
        }
    }

    struct Sessions {
        ids: Script<Option<&'static str>>,
        hints: Script<Option<bool>>,
    }

    #[async_trait]
    impl SessionSource for Sessions {
        async fn current_session(&self) -> Result<Option<SessionId>, SourceError> {
            Ok(self.ids.next().flatten().map(SessionId::from))
        }

        async fn locked_hint(&self, _: &SessionId) -> Result<Option<LockState>, SourceError> {
            match self.hints.next().flatten() {
                Some(locked) => Ok(Some(LockState::from_locked(locked))),
                None => Err(SourceError::Output {
                    command: "loginctl".to_string(),
                    reason: "no hint".to_string(),
                }),
            }
        }
    }

    struct History(Script<Vec<&'static str>>);

    #[async_trait]
    impl HistorySource for History {
        async fn rolling_history(&self, _: usize) -> Result<Vec<String>, SourceError> {
            Ok(self
                .0
                .next()
                .unwrap_or_default()
                .into_iter()
                .map(str::to_string)
                .collect())
        }
    }

    fn router(
        ids: Vec<Option<&'static str>>,
        hints: Vec<Option<bool>>,
        history: Vec<Vec<&'static str>>,
        store: Arc<MemoryStore>,
    ) -> ActivityRouter {
        let sessions = Arc::new(Sessions {
            ids: Script::new(ids),
            hints: Script::new(hints),
        });
        ActivityRouter::new(
            LockPoller::new(sessions),
            HistoryScanner::new(Arc::new(History(Script::new(history))), 30),
            store,
            Duration::from_millis(10),
        )
    }

    fn kinds(store: &MemoryStore) -> Vec<EventKind> {
        store.all_events().iter().map(|e| e.kind).collect()
    }

    #[tokio::test]
    async fn test_start_emits_login_and_initial_state() {
        let store = Arc::new(MemoryStore::new());
        let mut router = router(vec![Some("2")], vec![Some(false)], vec![vec![]], Arc::clone(&store));

        let state = router.start().await;

        assert_eq!(kinds(&store), vec![EventKind::Login, EventKind::Unlocked]);
        assert_eq!(store.all_events()[0].details, "script_start (session=2)");
        assert_eq!(state.session.last_locked, Some(LockState::Unlocked));
    }

    #[tokio::test]
    async fn test_start_without_session() {
        let store = Arc::new(MemoryStore::new());
        let mut router = router(vec![None], vec![Some(true)], vec![vec![]], Arc::clone(&store));

        let state = router.start().await;

        assert_eq!(kinds(&store), vec![EventKind::Login]);
        assert_eq!(store.all_events()[0].details, "script_start (session=none)");
        assert_eq!(state.session, SessionState::default());
    }

    #[tokio::test]
    async fn test_repeated_polls_emit_once_per_change() {
        let store = Arc::new(MemoryStore::new());
        let hints = vec![
            Some(false), // initial
            Some(false),
            Some(true),
            Some(true),
            None, // unknown keeps last state
            Some(true),
            Some(false),
        ];
        let mut router = router(vec![Some("2")], hints, vec![vec![]], Arc::clone(&store));

        let mut state = router.start().await;
        for _ in 0..6 {
            state = router.poll_cycle(state).await;
        }

        assert_eq!(
            kinds(&store),
            vec![
                EventKind::Login,
                EventKind::Unlocked,
                EventKind::Locked,
                EventKind::Unlocked
            ]
        );
    }

    #[tokio::test]
    async fn test_session_rebind_emits_nothing() {
        let store = Arc::new(MemoryStore::new());
        let mut router = router(
            vec![Some("2"), Some("2"), Some("5")],
            vec![Some(false)],
            vec![vec![]],
            Arc::clone(&store),
        );

        let state = router.start().await;
        let state = router.poll_cycle(state).await;
        assert_eq!(state.session.session_id, Some(SessionId::new("2")));

        let state = router.poll_cycle(state).await;
        assert_eq!(state.session.session_id, Some(SessionId::new("5")));
        assert_eq!(kinds(&store), vec![EventKind::Login, EventKind::Unlocked]);
    }

    #[tokio::test]
    async fn test_session_appearing_later_enables_lock_detection() {
        let store = Arc::new(MemoryStore::new());
        let mut router = router(
            vec![None, Some("7")],
            vec![Some(true)],
            vec![vec![]],
            Arc::clone(&store),
        );

        let state = router.start().await;
        let state = router.poll_cycle(state).await;

        assert_eq!(state.session.session_id, Some(SessionId::new("7")));
        assert_eq!(kinds(&store), vec![EventKind::Login, EventKind::Locked]);
    }

    #[tokio::test]
    async fn test_history_lines_become_events() {
        let store = Arc::new(MemoryStore::new());
        let mut router = router(
            vec![Some("2")],
            vec![Some(false)],
            vec![
                vec!["reboot   system boot  Mon 08:55"],
                vec!["suspend  Mon 12:00", "reboot   system boot  Mon 08:55"],
                vec!["shutdown system down  Mon 18:00", "suspend  Mon 12:00"],
            ],
            Arc::clone(&store),
        );

        let mut state = router.start().await;
        for _ in 0..3 {
            state = router.poll_cycle(state).await;
        }

        let events = store.all_events();
        let history: Vec<(EventKind, &str)> = events
            .iter()
            .skip(2)
            .map(|e| (e.kind, e.details.as_str()))
            .collect();
        assert_eq!(
            history,
            vec![
                (EventKind::Suspend, "suspend  Mon 12:00"),
                (EventKind::Shutdown, "shutdown system down  Mon 18:00"),
            ]
        );
    }

    #[tokio::test]
    async fn test_storage_outage_does_not_stall_detection() {
        let store = Arc::new(MemoryStore::new());
        let mut router = router(
            vec![Some("2")],
            vec![Some(false), Some(true), Some(false)],
            vec![vec![]],
            Arc::clone(&store),
        );

        let state = router.start().await;
        store.set_available(false);
        let state = router.poll_cycle(state).await;
        assert_eq!(state.session.last_locked, Some(LockState::Locked));

        store.set_available(true);
        router.poll_cycle(state).await;
        // The LOCKED event was lost, the next change is still detected
        assert_eq!(
            kinds(&store),
            vec![EventKind::Login, EventKind::Unlocked, EventKind::Unlocked]
        );
    }

    #[tokio::test]
    async fn test_emitted_times_never_decrease() {
        let store = Arc::new(MemoryStore::new());
        let mut router = router(vec![Some("2")], vec![Some(false)], vec![vec![]], Arc::clone(&store));
        for _ in 0..20 {
            router.emit(EventKind::Error, "").await;
        }
        let events = store.all_events();
        assert!(events.windows(2).all(|w| w[0].time <= w[1].time));
    }

    /// History source that answers the priming read and panics afterwards.
    struct FailingHistory(Mutex<u32>);

    #[async_trait]
    impl HistorySource for FailingHistory {
        async fn rolling_history(&self, _: usize) -> Result<Vec<String>, SourceError> {
            let mut calls = self.0.lock().unwrap();
            *calls += 1;
            if *calls > 1 {
                panic!("history reader failed");
            }
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_crash_event_keeps_clock_order() {
        let store = Arc::new(MemoryStore::new());
        let sessions = Arc::new(Sessions {
            ids: Script::new(vec![Some("2")]),
            hints: Script::new(vec![Some(false)]),
        });
        let router = ActivityRouter::new(
            LockPoller::new(sessions),
            HistoryScanner::new(Arc::new(FailingHistory(Mutex::new(0))), 30),
            store.clone(),
            Duration::from_millis(10),
        );

        // The wall clock is an hour behind what the loop already issued
        let ahead = chrono::Local::now().naive_local() + chrono::Duration::hours(1);
        router.clock.lock().unwrap().stamp(ahead);

        let result = spawn_router(router, CancellationToken::new()).await.unwrap();
        assert!(matches!(result, Err(RouterError::Panicked(_))));

        let events = store.all_events();
        let last = events.last().unwrap();
        assert_eq!(last.kind, EventKind::Error);
        assert!(last.time >= ahead);
        assert!(events.windows(2).all(|w| w[0].time <= w[1].time));
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("bang".to_string())), "bang");
        assert_eq!(panic_message(Box::new(42)), "unknown panic");
    }
}

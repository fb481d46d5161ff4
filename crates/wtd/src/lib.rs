//! WTD - Work tracker daemon
//!
//! This crate turns polled, noisy desktop-session signals into a durable,
//! deduplicated event log and per-day active-time summaries:
//! - `source` / `system` - signal sources (session, lock hint, power history, window focus)
//! - `poller` / `scanner` - lock-state sampling and power-history deduplication
//! - `router` - the activity event router (edge detection, one control loop)
//! - `focus` - application focus tracker
//! - `summary` - daily aggregation runs and the periodic summary task
//! - `store` - event, summary and usage storage (SQLite, in-memory)
//! - `dashboard` / `server` / `client` - read API and live-update socket
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐
//! │ LockPoller   │   │HistoryScanner│         ┌──────────────┐
//! └──────┬───────┘   └──────┬───────┘         │ FocusTracker │
//!        └────────┬─────────┘                 └──────┬───────┘
//!                 ▼                                  │ samples
//!        ┌─────────────────┐   events                ▼
//!        │ ActivityRouter  │───────────────▶ ┌──────────────┐
//!        └─────────────────┘                 │    Store     │
//!                                            └──┬────────┬──┘
//!        ┌─────────────────┐  events by day     │        │ reads
//!        │  SummaryTask    │◀───────────────────┘        ▼
//!        │ (aggregate,     │── upsert ───────▶ ┌────────────────┐
//!        │  upsert by day) │                   │ DashboardServer│──▶ subscribers
//!        └─────────────────┘                   └────────────────┘
//! ```
//!
//! Source failures degrade to "unknown"; storage failures are logged and
//! dropped.

pub mod client;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod focus;
pub mod poller;
pub mod router;
pub mod scanner;
pub mod server;
pub mod source;
pub mod store;
pub mod summary;
pub mod system;

//! SQLite-backed store.
//!
//! A connection is opened per call with WAL and a busy timeout, so the
//! router, focus tracker and summary task can write concurrently without
//! sharing a handle. Timestamps are stored as fixed-width local text
//! (`YYYY-MM-DD HH:MM:SS.ffffff`) so lexical order equals time order.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, params_from_iter, Connection, OpenFlags};

use wt_core::{
    day_end, day_start, format_timestamp, parse_day, parse_timestamp, AppUsageSample,
    DailySummary, Event, EventKind,
};

use super::{EventStore, SummaryStore, UsageStore};
use crate::error::StorageError;

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Store persisted in a single SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` and ensures the schema.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let store = Self { path: path.into() };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS activity_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    event_time TEXT NOT NULL,
                    event_type TEXT NOT NULL,
                    details TEXT NOT NULL DEFAULT ''
                 );
                 CREATE INDEX IF NOT EXISTS idx_activity_log_time ON activity_log(event_time);
                 CREATE TABLE IF NOT EXISTS daily_summary (
                    day TEXT PRIMARY KEY,
                    first_login TEXT,
                    last_logout TEXT,
                    total_active_seconds INTEGER NOT NULL DEFAULT 0
                 );
                 CREATE TABLE IF NOT EXISTS app_usage (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    event_time TEXT NOT NULL,
                    app_name TEXT NOT NULL,
                    window_title TEXT NOT NULL DEFAULT ''
                 );
                 CREATE INDEX IF NOT EXISTS idx_app_usage_time ON app_usage(event_time);
                 COMMIT;",
            )
            .map_err(|e| StorageError::Open(format!("failed to create schema: {e}")))
        })
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut conn = self.connect()?;
        op(&mut conn)
    }

    fn connect(&self) -> Result<Connection, StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Open(format!("failed to create data dir: {e}")))?;
            }
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(|e| StorageError::Open(format!("{}: {e}", self.path.display())))?;

        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|e| StorageError::Open(format!("failed to set busy_timeout: {e}")))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| StorageError::Open(format!("failed to enable WAL: {e}")))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| StorageError::Open(format!("failed to set synchronous: {e}")))?;

        Ok(conn)
    }

    fn query_events(
        &self,
        sql: &str,
        args: Vec<String>,
    ) -> Result<Vec<Event>, StorageError> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(sql).map_err(StorageError::query)?;
            let rows = stmt
                .query_map(params_from_iter(args.iter()), |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })
                .map_err(StorageError::query)?;

            let mut events = Vec::new();
            for row in rows {
                let (time, kind, details) = row.map_err(StorageError::decode)?;
                events.push(Event {
                    time: parse_timestamp(&time).map_err(StorageError::decode)?,
                    kind: EventKind::from_str(&kind).map_err(StorageError::decode)?,
                    details,
                });
            }
            Ok(events)
        })
    }
}

impl EventStore for SqliteStore {
    fn append(&self, event: &Event) -> Result<(), StorageError> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO activity_log (event_time, event_type, details) VALUES (?1, ?2, ?3)",
                params![format_timestamp(&event.time), event.kind.as_str(), event.details],
            )
            .map_err(StorageError::query)?;
            Ok(())
        })
    }

    fn events_for_day(&self, day: NaiveDate) -> Result<Vec<Event>, StorageError> {
        self.query_events(
            "SELECT event_time, event_type, details FROM activity_log \
             WHERE event_time >= ?1 AND event_time <= ?2 \
             ORDER BY event_time ASC, id ASC",
            vec![
                format_timestamp(&day_start(day)),
                format_timestamp(&day_end(day)),
            ],
        )
    }

    fn days_with_events(&self) -> Result<Vec<NaiveDate>, StorageError> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("SELECT DISTINCT substr(event_time, 1, 10) AS day FROM activity_log ORDER BY day ASC")
                .map_err(StorageError::query)?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(StorageError::query)?;

            let mut days = Vec::new();
            for row in rows {
                let day = row.map_err(StorageError::decode)?;
                days.push(parse_day(&day).map_err(StorageError::decode)?);
            }
            Ok(days)
        })
    }

    fn recent_events(&self, kinds: &[EventKind], limit: usize) -> Result<Vec<Event>, StorageError> {
        if kinds.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let names: Vec<String> = kinds
            .iter()
            .flat_map(|k| stored_names(*k))
            .map(str::to_string)
            .collect();
        let placeholders = (1..=names.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT event_time, event_type, details FROM activity_log \
             WHERE event_type IN ({placeholders}) \
             ORDER BY event_time DESC, id DESC LIMIT {limit}"
        );
        self.query_events(&sql, names)
    }
}

impl SummaryStore for SqliteStore {
    fn upsert_summary(&self, summary: &DailySummary) -> Result<(), StorageError> {
        let total = i64::try_from(summary.total_active_seconds).unwrap_or(i64::MAX);

        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO daily_summary (day, first_login, last_logout, total_active_seconds) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(day) DO UPDATE SET \
                    first_login = excluded.first_login, \
                    last_logout = excluded.last_logout, \
                    total_active_seconds = excluded.total_active_seconds",
                params![
                    summary.day.format(DAY_FORMAT).to_string(),
                    summary.first_login.as_ref().map(format_timestamp),
                    summary.last_logout.as_ref().map(format_timestamp),
                    total
                ],
            )
            .map_err(StorageError::query)?;
            Ok(())
        })
    }

    fn recent_summaries(&self, limit: usize) -> Result<Vec<DailySummary>, StorageError> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT day, first_login, last_logout, total_active_seconds \
                     FROM daily_summary ORDER BY day DESC LIMIT ?1",
                )
                .map_err(StorageError::query)?;
            let rows = stmt
                .query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })
                .map_err(StorageError::query)?;

            let mut summaries = Vec::new();
            for row in rows {
                let (day, first_login, last_logout, total) = row.map_err(StorageError::decode)?;
                summaries.push(DailySummary {
                    day: parse_day(&day).map_err(StorageError::decode)?,
                    first_login: parse_optional(first_login)?,
                    last_logout: parse_optional(last_logout)?,
                    total_active_seconds: u64::try_from(total).unwrap_or(0),
                });
            }
            Ok(summaries)
        })
    }
}

impl UsageStore for SqliteStore {
    fn append_usage(&self, sample: &AppUsageSample) -> Result<(), StorageError> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO app_usage (event_time, app_name, window_title) VALUES (?1, ?2, ?3)",
                params![format_timestamp(&sample.time), sample.app_name, sample.window_title],
            )
            .map_err(StorageError::query)?;
            Ok(())
        })
    }

    fn usage_since(&self, since: NaiveDateTime) -> Result<Vec<AppUsageSample>, StorageError> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT event_time, app_name, window_title FROM app_usage \
                     WHERE event_time >= ?1 ORDER BY event_time ASC, id ASC",
                )
                .map_err(StorageError::query)?;
            let rows = stmt
                .query_map(params![format_timestamp(&since)], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })
                .map_err(StorageError::query)?;

            let mut samples = Vec::new();
            for row in rows {
                let (time, app_name, window_title) = row.map_err(StorageError::decode)?;
                samples.push(AppUsageSample {
                    time: parse_timestamp(&time).map_err(StorageError::decode)?,
                    app_name,
                    window_title,
                });
            }
            Ok(samples)
        })
    }
}

/// Names a kind may be stored under, including legacy spellings.
fn stored_names(kind: EventKind) -> Vec<&'static str> {
    match kind {
        EventKind::BootResume => vec![kind.as_str(), "BOOT/RESUME"],
        EventKind::ScriptStopped => vec![kind.as_str(), "SCRIPT STOPPED MANUALLY"],
        _ => vec![kind.as_str()],
    }
}

fn parse_optional(value: Option<String>) -> Result<Option<NaiveDateTime>, StorageError> {
    value
        .map(|v| parse_timestamp(&v).map_err(StorageError::decode))
        .transpose()
}

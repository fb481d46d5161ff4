//! OS-backed signal sources.
//!
//! Each source shells out to a desktop utility (`loginctl`, `last`,
//! `xdotool`) through `tokio::process::Command` under a timeout. Output
//! parsing is kept in pure functions so it can be tested without the tools
//! installed.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, trace};

use wt_core::{LockState, SessionId};

use crate::error::SourceError;
use crate::source::{HistorySource, SessionSource, WindowSource};

/// Runs `program args..` and returns its stdout, which must be UTF-8.
async fn run_command(program: &str, args: &[&str], limit: Duration) -> Result<String, SourceError> {
    let command = std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");

    trace!(command = %command, "Running command");

    let output = match timeout(limit, Command::new(program).args(args).kill_on_drop(true).output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(SourceError::Spawn {
                command,
                reason: e.to_string(),
            })
        }
        Err(_) => {
            return Err(SourceError::Timeout {
                command,
                timeout: limit,
            })
        }
    };

    if !output.status.success() {
        return Err(SourceError::Failed {
            command,
            status: output.status.to_string(),
        });
    }

    String::from_utf8(output.stdout).map_err(|e| SourceError::Output {
        command,
        reason: e.to_string(),
    })
}

// ============================================================================
// loginctl
// ============================================================================

/// Session source backed by `loginctl`.
#[derive(Debug, Clone)]
pub struct LoginctlSessions {
    user: String,
    timeout: Duration,
}

impl LoginctlSessions {
    pub fn new(user: impl Into<String>, timeout: Duration) -> Self {
        Self {
            user: user.into(),
            timeout,
        }
    }

    /// Uses `$USER` (or `$LOGNAME`) as the session owner.
    pub fn for_current_user(timeout: Duration) -> Self {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("LOGNAME"))
            .unwrap_or_default();
        Self::new(user, timeout)
    }

    pub fn user(&self) -> &str {
        &self.user
    }
}

#[async_trait]
impl SessionSource for LoginctlSessions {
    async fn current_session(&self) -> Result<Option<SessionId>, SourceError> {
        let stdout = run_command("loginctl", &["list-sessions", "--no-legend"], self.timeout).await?;
        let session = parse_session_list(&stdout, &self.user);
        debug!(user = %self.user, session = ?session, "Resolved session");
        Ok(session)
    }

    async fn locked_hint(&self, session: &SessionId) -> Result<Option<LockState>, SourceError> {
        let stdout = run_command(
            "loginctl",
            &["show-session", session.as_str(), "-p", "LockedHint"],
            self.timeout,
        )
        .await?;
        Ok(parse_locked_hint(&stdout))
    }
}

/// Finds the first session owned by `user` in `loginctl list-sessions --no-legend` output.
///
/// Columns are `SESSION UID USER SEAT TTY ...`; only the first and third
/// are used.
pub fn parse_session_list(output: &str, user: &str) -> Option<SessionId> {
    output.lines().find_map(|line| {
        let mut cols = line.split_whitespace();
        let id = cols.next()?;
        let owner = cols.nth(1)?;
        (owner == user).then(|| SessionId::new(id))
    })
}

/// Parses `LockedHint=yes|no`. Anything else is unknown.
pub fn parse_locked_hint(output: &str) -> Option<LockState> {
    let value = output
        .lines()
        .find_map(|line| line.trim().strip_prefix("LockedHint="))?;

    match value.trim() {
        "yes" => Some(LockState::Locked),
        "no" => Some(LockState::Unlocked),
        _ => None,
    }
}

// ============================================================================
// last -x
// ============================================================================

/// Power history source backed by `last -x`.
#[derive(Debug, Clone)]
pub struct LastHistory {
    timeout: Duration,
}

impl LastHistory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl HistorySource for LastHistory {
    async fn rolling_history(&self, max_lines: usize) -> Result<Vec<String>, SourceError> {
        let count = max_lines.to_string();
        let stdout = run_command("last", &["-x", "-n", &count], self.timeout).await?;
        Ok(parse_history_lines(&stdout))
    }
}

/// Splits history output into trimmed, non-blank lines.
pub fn parse_history_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// xdotool
// ============================================================================

/// Foreground window source backed by `xdotool`.
#[derive(Debug, Clone)]
pub struct XdotoolWindow {
    timeout: Duration,
}

impl XdotoolWindow {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl WindowSource for XdotoolWindow {
    async fn foreground_title(&self) -> Result<Option<String>, SourceError> {
        let stdout = run_command("xdotool", &["getactivewindow", "getwindowname"], self.timeout).await?;
        Ok(parse_window_title(&stdout))
    }
}

/// Trims a window title; an empty title means no focused window.
pub fn parse_window_title(output: &str) -> Option<String> {
    let title = output.trim();
    (!title.is_empty()).then(|| title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSIONS: &str = "\
      c2 1000 alice seat0 tty2
       3  120 gdm   seat0 tty1
       7 1000 alice -     pts/0
";

    #[test]
    fn test_parse_session_list_picks_first_owned_session() {
        assert_eq!(parse_session_list(SESSIONS, "alice"), Some(SessionId::new("c2")));
        assert_eq!(parse_session_list(SESSIONS, "gdm"), Some(SessionId::new("3")));
        assert_eq!(parse_session_list(SESSIONS, "bob"), None);
        assert_eq!(parse_session_list("", "alice"), None);
    }

    #[test]
    fn test_parse_session_list_skips_short_lines() {
        assert_eq!(parse_session_list("c1\nc2 1000 alice\n", "alice"), Some(SessionId::new("c2")));
    }

    #[test]
    fn test_parse_locked_hint() {
        assert_eq!(parse_locked_hint("LockedHint=yes\n"), Some(LockState::Locked));
        assert_eq!(parse_locked_hint("LockedHint=no\n"), Some(LockState::Unlocked));
        assert_eq!(parse_locked_hint("LockedHint=\n"), None);
        assert_eq!(parse_locked_hint("Name=alice\n"), None);
        assert_eq!(parse_locked_hint(""), None);
    }

    #[test]
    fn test_parse_history_lines() {
        let output = "reboot   system boot  6.5.0   Mon Mar  4 08:55   still running\n\n  \nwtmp begins Fri Mar  1 10:00:00 2024\n";
        let lines = parse_history_lines(output);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("reboot"));
        assert!(lines[1].starts_with("wtmp begins"));
    }

    #[test]
    fn test_parse_window_title() {
        assert_eq!(parse_window_title("Editor - file.go\n").as_deref(), Some("Editor - file.go"));
        assert_eq!(parse_window_title("  \n"), None);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = run_command("wtd-no-such-program", &[], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_non_utf8_output_is_output_error() {
        let err = run_command("sh", &["-c", "printf '\\377'"], Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Output { .. }));
    }

    #[tokio::test]
    async fn test_utf8_output_is_returned() {
        let out = run_command("sh", &["-c", "printf 'yes'"], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out, "yes");
    }
}

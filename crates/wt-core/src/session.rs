//! Session identity and lock state.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::event::EventKind;

/// Identifier of a login session as reported by the session manager.
///
/// Opaque to the tracker: it is only compared for equality to detect
/// that the underlying session changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for an id that carries no information.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Observed lock state of a session.
///
/// "Unknown" is modelled as `Option<LockState>::None` at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    Locked,
    Unlocked,
}

impl LockState {
    /// Maps a boolean "locked" hint.
    pub fn from_locked(locked: bool) -> Self {
        if locked {
            Self::Locked
        } else {
            Self::Unlocked
        }
    }

    /// Event kind emitted when the session enters this state.
    pub fn event_kind(&self) -> EventKind {
        match self {
            Self::Locked => EventKind::Locked,
            Self::Unlocked => EventKind::Unlocked,
        }
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locked => write!(f, "locked"),
            Self::Unlocked => write!(f, "unlocked"),
        }
    }
}

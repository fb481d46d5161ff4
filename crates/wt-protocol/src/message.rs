//! Protocol message types for the dashboard socket.

use crate::version::ProtocolVersion;
use serde::{Deserialize, Serialize};
use wt_core::{AppUsageTotal, DailySummary, Event};

/// Requests a client can send to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageType {
    /// Handshake; must be the first message on a connection
    Connect {
        #[serde(skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },

    /// Most recent daily summaries, newest day first
    GetDailySummaries {
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },

    /// Most recent lock/power events, newest first
    GetRecentEvents {
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },

    /// Per-app usage over the trailing `days`
    GetAppUsage {
        #[serde(skip_serializing_if = "Option::is_none")]
        days: Option<u32>,
    },

    /// Start receiving periodic snapshots
    Subscribe,

    /// Stop receiving snapshots
    Unsubscribe,

    Ping {
        seq: u64,
    },

    Disconnect,
}

/// Messages sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    pub protocol_version: ProtocolVersion,

    #[serde(flatten)]
    pub message: MessageType,
}

impl ClientMessage {
    pub fn new(message: MessageType) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            message,
        }
    }

    pub fn connect(client_id: Option<String>) -> Self {
        Self::new(MessageType::Connect { client_id })
    }

    pub fn daily_summaries(limit: Option<usize>) -> Self {
        Self::new(MessageType::GetDailySummaries { limit })
    }

    pub fn recent_events(limit: Option<usize>) -> Self {
        Self::new(MessageType::GetRecentEvents { limit })
    }

    pub fn app_usage(days: Option<u32>) -> Self {
        Self::new(MessageType::GetAppUsage { days })
    }

    pub fn subscribe() -> Self {
        Self::new(MessageType::Subscribe)
    }

    pub fn unsubscribe() -> Self {
        Self::new(MessageType::Unsubscribe)
    }

    pub fn ping(seq: u64) -> Self {
        Self::new(MessageType::Ping { seq })
    }

    pub fn disconnect() -> Self {
        Self::new(MessageType::Disconnect)
    }
}

/// The three dashboard result sets, pushed to subscribers on a cadence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub daily_summaries: Vec<DailySummary>,
    pub recent_events: Vec<Event>,
    /// Today's top applications
    pub app_usage: Vec<AppUsageTotal>,
}

/// Messages sent from daemon to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonMessage {
    Connected {
        protocol_version: ProtocolVersion,
        client_id: String,
    },

    /// Handshake refused (incompatible protocol version)
    Rejected {
        reason: String,
        protocol_version: ProtocolVersion,
    },

    DailySummaries {
        summaries: Vec<DailySummary>,
    },

    RecentEvents {
        events: Vec<Event>,
    },

    AppUsage {
        usage: Vec<AppUsageTotal>,
    },

    /// Live update for subscribers
    Snapshot {
        snapshot: Box<DashboardSnapshot>,
    },

    Pong {
        seq: u64,
    },

    Error {
        message: String,
    },
}

impl DaemonMessage {
    pub fn connected(client_id: String) -> Self {
        Self::Connected {
            protocol_version: ProtocolVersion::CURRENT,
            client_id,
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    pub fn daily_summaries(summaries: Vec<DailySummary>) -> Self {
        Self::DailySummaries { summaries }
    }

    pub fn recent_events(events: Vec<Event>) -> Self {
        Self::RecentEvents { events }
    }

    pub fn app_usage(usage: Vec<AppUsageTotal>) -> Self {
        Self::AppUsage { usage }
    }

    pub fn snapshot(snapshot: DashboardSnapshot) -> Self {
        Self::Snapshot {
            snapshot: Box::new(snapshot),
        }
    }

    pub fn pong(seq: u64) -> Self {
        Self::Pong { seq }
    }

    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }
}

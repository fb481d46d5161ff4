//! Request/response client for the dashboard socket.
//!
//! Used by `wtd report`. Each request writes one JSON line and reads
//! lines until the matching reply arrives; pushed snapshots that arrive in
//! between are skipped.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::debug;

use wt_core::{AppUsageTotal, DailySummary, Event};
use wt_protocol::{ClientMessage, DaemonMessage};

/// Time allowed for each reply
const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {path}: {reason}")]
    Connect { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("daemon closed the connection")]
    Closed,

    #[error("timed out waiting for the daemon")]
    Timeout,

    #[error("connection rejected: {0}")]
    Rejected(String),

    #[error("daemon error: {0}")]
    Daemon(String),

    #[error("unexpected reply: {0}")]
    Unexpected(String),
}

pub struct DashboardClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    client_id: String,
}

impl DashboardClient {
    /// Connects and performs the protocol handshake.
    pub async fn connect(socket_path: &Path, client_id: Option<String>) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(|e| ClientError::Connect {
                path: socket_path.display().to_string(),
                reason: e.to_string(),
            })?;
        let (reader, writer) = stream.into_split();

        let mut client = Self {
            reader: BufReader::new(reader),
            writer,
            client_id: String::new(),
        };

        client.send(&ClientMessage::connect(client_id)).await?;
        match client.recv().await? {
            DaemonMessage::Connected { client_id, .. } => {
                debug!(client_id = %client_id, "Connected to daemon");
                client.client_id = client_id;
                Ok(client)
            }
            DaemonMessage::Rejected { reason, .. } => Err(ClientError::Rejected(reason)),
            DaemonMessage::Error { message } => Err(ClientError::Daemon(message)),
            other => Err(ClientError::Unexpected(format!("{other:?}"))),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub async fn daily_summaries(&mut self, limit: Option<usize>) -> Result<Vec<DailySummary>, ClientError> {
        match self.request(&ClientMessage::daily_summaries(limit)).await? {
            DaemonMessage::DailySummaries { summaries } => Ok(summaries),
            other => Err(unexpected(other)),
        }
    }

    pub async fn recent_events(&mut self, limit: Option<usize>) -> Result<Vec<Event>, ClientError> {
        match self.request(&ClientMessage::recent_events(limit)).await? {
            DaemonMessage::RecentEvents { events } => Ok(events),
            other => Err(unexpected(other)),
        }
    }

    pub async fn app_usage(&mut self, days: Option<u32>) -> Result<Vec<AppUsageTotal>, ClientError> {
        match self.request(&ClientMessage::app_usage(days)).await? {
            DaemonMessage::AppUsage { usage } => Ok(usage),
            other => Err(unexpected(other)),
        }
    }

    pub async fn ping(&mut self, seq: u64) -> Result<(), ClientError> {
        match self.request(&ClientMessage::ping(seq)).await? {
            DaemonMessage::Pong { seq: got } if got == seq => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Sends `Disconnect` and drops the connection.
    pub async fn disconnect(mut self) -> Result<(), ClientError> {
        self.send(&ClientMessage::disconnect()).await
    }

    /// Sends a request and returns the first reply that is not a pushed snapshot.
    async fn request(&mut self, msg: &ClientMessage) -> Result<DaemonMessage, ClientError> {
        self.send(msg).await?;
        loop {
            match self.recv().await? {
                DaemonMessage::Snapshot { .. } => continue,
                DaemonMessage::Error { message } => return Err(ClientError::Daemon(message)),
                reply => return Ok(reply),
            }
        }
    }

    async fn send(&mut self, msg: &ClientMessage) -> Result<(), ClientError> {
        let json = serde_json::to_string(msg).map_err(|e| ClientError::Io(e.to_string()))?;
        self.writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| ClientError::Io(e.to_string()))?;
        self.writer
            .write_all(b"\n")
            .await
            .map_err(|e| ClientError::Io(e.to_string()))?;
        self.writer
            .flush()
            .await
            .map_err(|e| ClientError::Io(e.to_string()))
    }

    async fn recv(&mut self) -> Result<DaemonMessage, ClientError> {
        let mut line = String::new();
        let read = timeout(REPLY_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .map_err(|_| ClientError::Timeout)?
            .map_err(|e| ClientError::Io(e.to_string()))?;

        if read == 0 {
            return Err(ClientError::Closed);
        }

        serde_json::from_str(&line).map_err(|e| ClientError::Unexpected(e.to_string()))
    }
}

fn unexpected(msg: DaemonMessage) -> ClientError {
    ClientError::Unexpected(format!("{msg:?}"))
}

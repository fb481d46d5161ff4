//! Unix socket server for dashboard clients.
//!
//! The server:
//! - Listens on a Unix socket for client connections
//! - Spawns a ConnectionHandler for each client
//! - Pushes a dashboard snapshot to every subscriber on a fixed cadence
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ DashboardServer │
//! │                 │
//! │  UnixListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│ DashboardReader │
//! │   (per client)  │     │                 │
//! └─────────────────┘     └────────┬────────┘
//!                                  │ snapshot every broadcast interval
//!                                  ▼
//!                         ┌─────────────────┐
//!                         │   subscribers   │
//!                         └─────────────────┘
//! ```

mod connection;

pub use connection::{ConnectionError, ConnectionHandler, Subscriber, SubscriberWriter, SubscribersMap};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::UnixListener;
use tokio::sync::RwLock;
use tokio::time::{timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use wt_protocol::DaemonMessage;

use crate::dashboard::DashboardReader;

/// Maximum number of concurrent subscribers
pub const MAX_SUBSCRIBERS: usize = 10;

/// Write timeout for pushed snapshots
const BROADCAST_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Unix socket server for dashboard clients.
pub struct DashboardServer {
    /// Path to the Unix socket
    socket_path: PathBuf,

    reader: DashboardReader,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for generating client IDs
    connection_counter: AtomicU64,

    /// Active subscribers (keyed by client_id)
    subscribers: SubscribersMap,

    broadcast_interval: Duration,
}

impl DashboardServer {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        reader: DashboardReader,
        cancel_token: CancellationToken,
    ) -> Self {
        let broadcast_interval = reader.config().broadcast_interval();
        Self {
            socket_path: socket_path.into(),
            reader,
            cancel_token,
            connection_counter: AtomicU64::new(0),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            broadcast_interval: broadcast_interval.max(Duration::from_millis(1)),
        }
    }

    /// Runs the server.
    ///
    /// Listens for connections until the cancellation token is triggered.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind()?;

        info!(
            socket = %self.socket_path.display(),
            "Dashboard server listening"
        );

        self.spawn_snapshot_broadcaster();

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        self.cleanup().await;
        Ok(())
    }

    fn bind(&self) -> Result<UnixListener, ServerError> {
        let setup_error = |e: std::io::Error| ServerError::SocketSetup {
            path: self.socket_path.clone(),
            error: e.to_string(),
        };

        // Stale socket from a previous run
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(setup_error)?;
        }

        if let Some(parent) = self.socket_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(setup_error)?;
            }
        }

        UnixListener::bind(&self.socket_path).map_err(setup_error)
    }

    /// Handles a new client connection by spawning a handler task.
    fn handle_connection(&self, stream: tokio::net::UnixStream, connection_number: u64) {
        let (reader, writer) = stream.into_split();
        let dashboard = self.reader.clone();
        let subscribers = Arc::clone(&self.subscribers);

        tokio::spawn(async move {
            let handler = ConnectionHandler::new(
                reader,
                writer,
                dashboard,
                Arc::clone(&subscribers),
                connection_number,
            );

            let client_id = handler.run().await;

            if let Some(id) = client_id {
                let mut subs = subscribers.write().await;
                if subs.remove(&id).is_some() {
                    debug!(client_id = %id, "Removed disconnected subscriber");
                }
            }
        });
    }

    /// Spawns the task that pushes a snapshot to all subscribers every
    /// broadcast interval.
    fn spawn_snapshot_broadcaster(&self) {
        let subscribers = Arc::clone(&self.subscribers);
        let cancel_token = self.cancel_token.clone();
        let dashboard = self.reader.clone();
        let period = self.broadcast_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Snapshot broadcaster shutting down");
                        break;
                    }

                    _ = ticker.tick() => {
                        if subscribers.read().await.is_empty() {
                            continue;
                        }
                        let msg = DaemonMessage::snapshot(dashboard.snapshot().await);
                        broadcast_message(&subscribers, &msg).await;
                    }
                }
            }
        });
    }

    /// Performs cleanup on shutdown.
    async fn cleanup(&self) {
        self.subscribers.write().await.clear();

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(
                    socket = %self.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            }
        }

        info!("Server cleanup complete");
    }
}

/// Sends a message to every subscriber, dropping those whose write fails.
async fn broadcast_message(subscribers: &SubscribersMap, msg: &DaemonMessage) {
    let json = match serde_json::to_string(msg) {
        Ok(j) => j,
        Err(e) => {
            error!(error = %e, "Failed to serialize broadcast");
            return;
        }
    };

    let subs = subscribers.read().await;
    let mut failed_clients = Vec::new();

    for (client_id, sub) in subs.iter() {
        let mut writer = sub.writer.lock().await;
        let send_result = timeout(BROADCAST_WRITE_TIMEOUT, async {
            writer.write_all(json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        })
        .await;

        match send_result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(client_id = %client_id, error = %e, "Failed to push snapshot");
                failed_clients.push(client_id.clone());
            }
            Err(_) => {
                debug!(client_id = %client_id, "Snapshot push timed out");
                failed_clients.push(client_id.clone());
            }
        }
    }

    // Need to drop the read lock before taking the write lock
    drop(subs);

    if !failed_clients.is_empty() {
        let mut subs = subscribers.write().await;
        for client_id in failed_clients {
            subs.remove(&client_id);
            debug!(client_id = %client_id, "Removed failed subscriber");
        }
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to setup socket at {path}: {error}")]
    SocketSetup { path: PathBuf, error: String },

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let err = ServerError::SocketSetup {
            path: PathBuf::from("/tmp/test.sock"),
            error: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("/tmp/test.sock"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_connection_error_converts() {
        let err: ServerError = ConnectionError::Timeout.into();
        assert!(err.to_string().contains("Read timeout"));
    }
}

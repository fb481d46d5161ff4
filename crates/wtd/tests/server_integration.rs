//! Integration tests for the dashboard socket server.
//!
//! These tests run a DashboardServer over a temporary socket backed by an
//! in-memory store and exercise the handshake, the read API, live
//! snapshots and graceful shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use wt_core::{AppUsageSample, DailySummary, Event, EventKind};
use wt_protocol::{ClientMessage, DaemonMessage, MessageType, ProtocolVersion};
use wtd::client::DashboardClient;
use wtd::config::DashboardConfig;
use wtd::dashboard::DashboardReader;
use wtd::server::DashboardServer;
use wtd::store::{EventStore, MemoryStore, SummaryStore, UsageStore};

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for server socket to appear
const SOCKET_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Interval between socket existence checks
const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Grace period for server shutdown
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_millis(100);

// ============================================================================
// Test Helpers
// ============================================================================

struct TestServer {
    socket_path: PathBuf,
    cancel_token: CancellationToken,
    store: Arc<MemoryStore>,
    _temp_dir: TempDir,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with_broadcast(60).await
    }

    async fn spawn_with_broadcast(broadcast_interval_secs: u64) -> Self {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let socket_path = temp_dir.path().join("test.sock");
        let store = Arc::new(MemoryStore::new());
        let cancel_token = CancellationToken::new();

        let config = DashboardConfig {
            broadcast_interval_secs,
            ..DashboardConfig::default()
        };
        let reader = DashboardReader::new(store.clone(), config, chrono::Duration::minutes(30));
        let server = DashboardServer::new(socket_path.clone(), reader, cancel_token.clone());

        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let start = tokio::time::Instant::now();
        while start.elapsed() < SOCKET_WAIT_TIMEOUT {
            if socket_path.exists() {
                break;
            }
            sleep(SOCKET_POLL_INTERVAL).await;
        }

        assert!(
            socket_path.exists(),
            "Server socket did not appear within {SOCKET_WAIT_TIMEOUT:?}"
        );

        TestServer {
            socket_path,
            cancel_token,
            store,
            _temp_dir: temp_dir,
        }
    }

    async fn connect(&self) -> TestClient {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .expect("connect to server");
        TestClient::new(stream)
    }

    async fn shutdown(self) {
        self.cancel_token.cancel();
        sleep(SHUTDOWN_GRACE_PERIOD).await;
    }
}

struct TestClient {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
}

impl TestClient {
    fn new(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn send(&mut self, msg: ClientMessage) {
        let json = serde_json::to_string(&msg).unwrap();
        self.send_raw(&json).await;
    }

    async fn recv(&mut self) -> DaemonMessage {
        let mut line = String::new();
        timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("reply within timeout")
            .unwrap();
        serde_json::from_str(&line).unwrap()
    }

    async fn handshake(&mut self, client_id: Option<String>) -> String {
        self.send(ClientMessage::connect(client_id)).await;
        match self.recv().await {
            DaemonMessage::Connected { client_id, .. } => client_id,
            other => panic!("Expected Connected, got {other:?}"),
        }
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

fn seed(store: &MemoryStore) {
    for (kind, h) in [
        (EventKind::Login, 8),
        (EventKind::Unlocked, 9),
        (EventKind::Locked, 12),
        (EventKind::Suspend, 13),
    ] {
        store
            .append(&Event::new(kind, day(4).and_hms_opt(h, 0, 0).unwrap(), ""))
            .unwrap();
    }
    for d in [2, 3, 4] {
        store.upsert_summary(&DailySummary::empty(day(d))).unwrap();
    }
}

// ============================================================================
// Handshake Tests
// ============================================================================

#[tokio::test]
async fn test_handshake_success() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client
        .send(ClientMessage::connect(Some("dashboard".to_string())))
        .await;

    match client.recv().await {
        DaemonMessage::Connected {
            protocol_version,
            client_id,
        } => {
            assert_eq!(protocol_version, ProtocolVersion::CURRENT);
            assert_eq!(client_id, "dashboard");
        }
        other => panic!("Expected Connected, got {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_handshake_rejects_incompatible_version() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client
        .send(ClientMessage {
            protocol_version: ProtocolVersion::new(99, 0),
            message: MessageType::Connect { client_id: None },
        })
        .await;

    match client.recv().await {
        DaemonMessage::Rejected { reason, .. } => assert!(reason.contains("99.0")),
        other => panic!("Expected Rejected, got {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_request_before_connect_is_refused() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.send(ClientMessage::daily_summaries(None)).await;
    assert!(matches!(client.recv().await, DaemonMessage::Error { .. }));

    server.shutdown().await;
}

// ============================================================================
// Read API Tests
// ============================================================================

#[tokio::test]
async fn test_read_api() {
    let server = TestServer::spawn().await;
    seed(&server.store);

    let mut client = server.connect().await;
    client.handshake(None).await;

    client.send(ClientMessage::daily_summaries(Some(2))).await;
    match client.recv().await {
        DaemonMessage::DailySummaries { summaries } => {
            let days: Vec<NaiveDate> = summaries.iter().map(|s| s.day).collect();
            assert_eq!(days, vec![day(4), day(3)]);
        }
        other => panic!("Expected DailySummaries, got {other:?}"),
    }

    client.send(ClientMessage::recent_events(None)).await;
    match client.recv().await {
        DaemonMessage::RecentEvents { events } => {
            let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
            assert_eq!(
                kinds,
                vec![EventKind::Suspend, EventKind::Locked, EventKind::Unlocked]
            );
        }
        other => panic!("Expected RecentEvents, got {other:?}"),
    }

    client.send(ClientMessage::ping(7)).await;
    assert!(matches!(client.recv().await, DaemonMessage::Pong { seq: 7 }));

    server.shutdown().await;
}

#[tokio::test]
async fn test_malformed_line_keeps_connection() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;
    client.handshake(None).await;

    client.send_raw("{not json").await;
    assert!(matches!(client.recv().await, DaemonMessage::Error { .. }));

    client.send(ClientMessage::ping(1)).await;
    assert!(matches!(client.recv().await, DaemonMessage::Pong { seq: 1 }));

    server.shutdown().await;
}

#[tokio::test]
async fn test_storage_outage_returns_empty_lists() {
    let server = TestServer::spawn().await;
    seed(&server.store);
    server.store.set_available(false);

    let mut client = server.connect().await;
    client.handshake(None).await;

    client.send(ClientMessage::daily_summaries(None)).await;
    match client.recv().await {
        DaemonMessage::DailySummaries { summaries } => assert!(summaries.is_empty()),
        other => panic!("Expected DailySummaries, got {other:?}"),
    }

    server.shutdown().await;
}

// ============================================================================
// Live Update Tests
// ============================================================================

#[tokio::test]
async fn test_subscribe_sends_snapshot_immediately_and_periodically() {
    let server = TestServer::spawn_with_broadcast(1).await;
    seed(&server.store);

    let now = Local::now().naive_local();
    server
        .store
        .append_usage(&AppUsageSample {
            time: now - chrono::Duration::seconds(30),
            app_name: "Terminal".to_string(),
            window_title: "Terminal".to_string(),
        })
        .unwrap();

    let mut client = server.connect().await;
    client.handshake(Some("live".to_string())).await;
    client.send(ClientMessage::subscribe()).await;

    let first = match client.recv().await {
        DaemonMessage::Snapshot { snapshot } => snapshot,
        other => panic!("Expected Snapshot, got {other:?}"),
    };
    assert_eq!(first.daily_summaries.len(), 3);
    assert_eq!(first.recent_events.len(), 3);
    if first.app_usage.first().map(|u| u.day) == Some(now.date()) {
        assert_eq!(first.app_usage[0].app_name, "Terminal");
    }

    // Pushed on the broadcast cadence
    assert!(matches!(client.recv().await, DaemonMessage::Snapshot { .. }));

    server.shutdown().await;
}

#[tokio::test]
async fn test_unsubscribe_stops_snapshots() {
    let server = TestServer::spawn_with_broadcast(1).await;
    let mut client = server.connect().await;
    client.handshake(None).await;

    client.send(ClientMessage::subscribe()).await;
    assert!(matches!(client.recv().await, DaemonMessage::Snapshot { .. }));

    client.send(ClientMessage::unsubscribe()).await;
    client.send(ClientMessage::ping(3)).await;
    // A broadcast may already be in flight; skip it
    let reply = match client.recv().await {
        DaemonMessage::Snapshot { .. } => client.recv().await,
        other => other,
    };
    assert!(matches!(reply, DaemonMessage::Pong { seq: 3 }));

    let mut line = String::new();
    let quiet = timeout(Duration::from_millis(1500), client.reader.read_line(&mut line)).await;
    assert!(quiet.is_err(), "received unexpected message: {line}");

    server.shutdown().await;
}

// ============================================================================
// Client and Shutdown Tests
// ============================================================================

#[tokio::test]
async fn test_dashboard_client_roundtrip() {
    let server = TestServer::spawn().await;
    seed(&server.store);

    let mut client = DashboardClient::connect(&server.socket_path, Some("report".to_string()))
        .await
        .unwrap();
    assert_eq!(client.client_id(), "report");

    assert_eq!(client.daily_summaries(Some(10)).await.unwrap().len(), 3);
    assert_eq!(client.recent_events(Some(1)).await.unwrap().len(), 1);
    assert!(client.app_usage(Some(7)).await.unwrap().is_empty());
    client.ping(42).await.unwrap();
    client.disconnect().await.unwrap();

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_removes_socket() {
    let server = TestServer::spawn().await;
    let socket_path = server.socket_path.clone();
    assert!(socket_path.exists());

    server.cancel_token.cancel();
    sleep(SHUTDOWN_GRACE_PERIOD).await;

    assert!(!socket_path.exists());
}

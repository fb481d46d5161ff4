//! WTD - Work tracker daemon
//!
//! Records lock/unlock, suspend, shutdown and boot events plus application
//! focus switches, maintains daily active-time summaries and serves them to
//! dashboard clients over a Unix socket.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! wtd start
//!
//! # Start the daemon (background/daemonized)
//! wtd start -d
//!
//! # Stop the daemon
//! wtd stop
//!
//! # Check daemon status
//! wtd status
//!
//! # Recompute daily summaries (all days, or one)
//! wtd summarize
//! wtd summarize --day 2024-03-04
//!
//! # Print a report from the running daemon
//! wtd report --days 7
//!
//! # Enable debug logging
//! RUST_LOG=wtd=debug wtd start
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: stop the router (records SCRIPT_STOPPED) and shut down

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use wt_core::parse_day;
use wtd::client::DashboardClient;
use wtd::config::{state_dir, Config};
use wtd::dashboard::DashboardReader;
use wtd::focus::FocusTracker;
use wtd::poller::LockPoller;
use wtd::router::{spawn_router, ActivityRouter};
use wtd::scanner::HistoryScanner;
use wtd::server::DashboardServer;
use wtd::store::{blocking, SqliteStore};
use wtd::summary::{log_summaries, refresh_day, spawn_summary_task, summarize_all, summarize_day};
use wtd::system::{LastHistory, LoginctlSessions, XdotoolWindow};

/// Work tracker daemon - desktop activity and daily active time
#[derive(Parser, Debug)]
#[command(name = "wtd", version, about)]
struct Args {
    /// Configuration file (defaults to <config_dir>/work-tracker/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
    /// Recompute and store daily summaries
    Summarize {
        /// Only this day (YYYY-MM-DD)
        #[arg(long)]
        day: Option<String>,
    },
    /// Print summaries and top applications from the running daemon
    Report {
        /// Number of days to include
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
}

fn pid_file_path() -> PathBuf {
    state_dir().join("wtd.pid")
}

fn log_file_path() -> PathBuf {
    state_dir().join("wtd.log")
}

fn read_pid() -> Option<u32> {
    let mut file = File::open(pid_file_path()).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

/// Returns the PID of a running daemon, clearing a stale PID file.
fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        remove_pid_file();
    }
    None
}

fn stop_daemon(pid: u32) -> Result<()> {
    let pid = i32::try_from(pid).context("PID out of range")?;
    // SAFETY: kill(2) has no memory-safety preconditions
    let result = unsafe { libc::kill(pid, libc::SIGTERM) };
    if result != 0 {
        bail!("Failed to send SIGTERM to process {pid}");
    }
    Ok(())
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("wtd=info".parse()?)
                .add_directive("wt_core=info".parse()?)
                .add_directive("wt_protocol=info".parse()?),
        )
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let command = args.command.unwrap_or(Command::Start { daemon: false });
    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    match command {
        Command::Start { daemon } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'wtd stop' to stop it first.");
                process::exit(1);
            }

            if daemon {
                // Must happen before the tokio runtime starts
                daemonize()?;
            }

            write_pid()?;
            let result = run_daemon(config);
            remove_pid_file();
            result
        }
        Command::Stop => {
            let Some(pid) = is_daemon_running() else {
                println!("Daemon is not running.");
                return Ok(());
            };

            println!("Stopping daemon (PID {pid})...");
            stop_daemon(pid)?;

            for _ in 0..50 {
                if !is_process_running(pid) {
                    println!("Daemon stopped.");
                    return Ok(());
                }
                std::thread::sleep(std::time::Duration::from_millis(100));
            }

            eprintln!("Daemon did not stop within 5 seconds.");
            process::exit(1);
        }
        Command::Status => {
            let Some(pid) = is_daemon_running() else {
                println!("Daemon is not running.");
                process::exit(1);
            };

            println!("Daemon is running (PID {pid})");
            if config.socket_path.exists() {
                println!("Socket: {}", config.socket_path.display());
            }
            println!("Database: {}", config.database_path.display());
            Ok(())
        }
        Command::Summarize { day } => {
            init_tracing()?;
            run_summarize(&config, day.as_deref())
        }
        Command::Report { days } => run_report(&config.socket_path, days),
    }
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::options()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file for stdout")?;
    let stderr = stdout.try_clone().context("Failed to open log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

/// Runs the daemon (async entry point).
#[tokio::main]
async fn run_daemon(config: Config) -> Result<()> {
    init_tracing()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        database = %config.database_path.display(),
        "Work tracker daemon starting"
    );

    let store = Arc::new(
        SqliteStore::open(&config.database_path).context("Failed to open tracker database")?,
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let command_timeout = config.tracker.command_timeout();

    let sessions = LoginctlSessions::for_current_user(command_timeout);
    if sessions.user().is_empty() {
        warn!("USER is not set, no session can be matched");
    }
    let router = ActivityRouter::new(
        LockPoller::new(Arc::new(sessions)),
        HistoryScanner::new(
            Arc::new(LastHistory::new(command_timeout)),
            config.tracker.history_lines,
        ),
        store.clone(),
        config.tracker.poll_interval(),
    )
    .with_seen_history_cap(config.tracker.seen_history_cap);
    let router_handle = spawn_router(router, cancel_token.clone());
    info!("Activity router started");

    let focus_handle = if config.focus.enabled {
        let tracker = FocusTracker::new(
            Arc::new(XdotoolWindow::new(command_timeout)),
            store.clone(),
            config.focus.poll_interval(),
        );
        info!("Focus tracker started");
        Some(tokio::spawn(tracker.run(cancel_token.clone())))
    } else {
        None
    };

    let summary_handle = spawn_summary_task(
        Arc::clone(&store),
        config.summary.interval(),
        cancel_token.clone(),
    );

    let reader = DashboardReader::new(
        store.clone(),
        config.dashboard.clone(),
        config.focus.max_sample_gap(),
    );
    let server = DashboardServer::new(&config.socket_path, reader, cancel_token.clone());
    let server_handle = tokio::spawn(async move { server.run().await });

    // The router ends on cancellation or when it crashes
    let router_result = router_handle.await.context("Router task failed to join")?;
    cancel_token.cancel();

    if let Some(handle) = focus_handle {
        let _ = handle.await;
    }
    let _ = summary_handle.await;
    let server_result = server_handle.await.context("Server task failed to join")?;

    let today = Local::now().date_naive();
    let final_store = Arc::clone(&store);
    if let Err(e) = blocking(move || refresh_day(final_store.as_ref(), today)).await {
        warn!(day = %today, error = %e, "Final summary failed");
    }

    router_result.context("Activity router crashed")?;
    server_result.context("Dashboard server failed")?;

    info!("Work tracker daemon stopped");
    Ok(())
}

fn run_summarize(config: &Config, day: Option<&str>) -> Result<()> {
    let store = SqliteStore::open(&config.database_path).context("Failed to open tracker database")?;

    let summaries = match day {
        Some(day) => {
            let day = parse_day(day)?;
            vec![summarize_day(&store, day)?]
        }
        None => summarize_all(&store)?,
    };

    log_summaries(&summaries);
    println!("Summarized {} day(s).", summaries.len());
    Ok(())
}

#[tokio::main]
async fn run_report(socket_path: &Path, days: u32) -> Result<()> {
    let mut client = DashboardClient::connect(socket_path, Some("wtd-report".to_string()))
        .await
        .context("Is the daemon running? Try 'wtd start'")?;

    let summaries = client.daily_summaries(Some(days as usize)).await?;
    let usage = client.app_usage(Some(days)).await?;
    client.disconnect().await?;

    println!("{:<12} {:>10} {:>10} {:>8}", "DAY", "FIRST", "LAST", "HOURS");
    for s in &summaries {
        let time = |t: Option<chrono::NaiveDateTime>| {
            t.map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string())
        };
        println!(
            "{:<12} {:>10} {:>10} {:>8.2}",
            s.day,
            time(s.first_login),
            time(s.last_logout),
            s.active_hours()
        );
    }

    println!();
    println!("{:<12} {:<30} {:>8} {:>8}", "DAY", "APPLICATION", "MINUTES", "%");
    for u in usage.iter().take(20) {
        println!(
            "{:<12} {:<30} {:>8} {:>8.2}",
            u.day,
            u.app_name,
            u.duration_seconds / 60,
            u.percentage
        );
    }

    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT");
        }
    }

    Ok(())
}

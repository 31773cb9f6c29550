//! RFID dashboard - headless operator console
//!
//! Subscribes to the simulation engine's tag feed, keeps the last 50 reads and
//! the run state, and exposes them on the status endpoint.
//!
//! Module structure:
//! - `domain/` - Tag reads, payloads, source and parameter types
//! - `io/` - External interfaces (engine HTTP, WebSocket stream, status server)
//! - `services/` - Buffer, run state, dashboard fold, control, console
//! - `infra/` - Infrastructure (Config, Metrics, logging)

use clap::Parser;
use rfid_dashboard::infra::{logging, Config, Metrics};
use rfid_dashboard::services::{Console, StartOutcome};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// RFID dashboard - headless operator console for the reader simulation engine
#[derive(Parser, Debug)]
#[command(name = "rfid-dashboard", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Start the simulation with the configured parameters and stop it on exit
    /// (a run that was already going is left alone)
    #[arg(long)]
    start: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_stdout();

    info!(git_hash = env!("GIT_HASH"), "rfid-dashboard starting");

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(|| Config::resolve_config_path(&[]));
    let config = Config::load_from_path(&config_path);

    info!(
        config_file = %config.config_file(),
        engine = %config.engine_base_url(),
        stream = %config.stream_url(),
        request_timeout_ms = %config.request_timeout().as_millis(),
        tag_count = %config.params().tag_count,
        interval = %config.params().interval_seconds,
        use_stream_source = config.source().use_stream_source,
        use_webhook = config.source().use_webhook,
        status_port = %config.status_port(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());
    let console = Console::new(&config, metrics.clone())?;

    // Start status HTTP server (if port > 0)
    let status_port = config.status_port();
    if status_port > 0 {
        let dashboard = console.dashboard().clone();
        let status_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) =
                rfid_dashboard::io::status_server::start_status_server(status_port, dashboard, status_shutdown).await
            {
                error!(error = %e, "status server error");
            }
        });
    }

    // Start metrics reporter
    let metrics_interval = config.metrics_interval_secs().max(1);
    let mut reporter_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            tokio::select! {
                _ = interval.tick() => metrics.report().log(),
                _ = reporter_shutdown.changed() => break,
            }
        }
    });

    // Log every run-state and connection transition
    let mut snapshots = console.dashboard().subscribe();
    tokio::spawn(async move {
        let (mut run_state, mut connected) = {
            let snapshot = snapshots.borrow();
            (snapshot.run_state, snapshot.connected)
        };
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            if snapshot.run_state != run_state || snapshot.connected != connected {
                info!(
                    run_state = %snapshot.run_state,
                    connected = snapshot.connected,
                    buffered = %snapshot.reads.len(),
                    "dashboard_status"
                );
                run_state = snapshot.run_state;
                connected = snapshot.connected;
            }
        }
    });

    if config.stream_auto_enable() {
        console.sync_stream();
    }

    let mut started = false;
    if args.start {
        match console.start().await {
            Ok(StartOutcome::Issued) => started = true,
            // Someone else's run; leave it going on exit
            Ok(StartOutcome::AlreadyRunning) => info!("simulation_already_running"),
            Err(e) => warn!(error = %e, "simulation_start_failed"),
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown_signal_received");

    if started {
        if let Err(e) = console.stop().await {
            warn!(error = %e, "simulation_stop_failed");
        }
    }

    console.stream().disable();
    let _ = shutdown_tx.send(true);

    console.dashboard().metrics().summary().log();
    info!("rfid-dashboard shutdown complete");
    Ok(())
}

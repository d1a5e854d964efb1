//! Ravo Replication Monitor - Main entry point
//!
//! Polls the active/standby replicas and serves the dashboard snapshot.

use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ravo_monitor::{config::MonitorConfig, server, StatusAggregator, SYSTEM_NAME, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let matches = Command::new(SYSTEM_NAME)
        .version(VERSION)
        .about("Replication drift detection and metrics aggregation for an active/standby MySQL pair")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file layered over the defaults"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error), overrides the configuration"),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .help("Run a single poll cycle, print the snapshot as JSON and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("check-config")
                .long("check-config")
                .help("Load and validate the configuration, then exit")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let config = MonitorConfig::load(config_path).context("failed to load configuration")?;

    let log_level = matches
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| config.global.log_level.clone());
    init_logging(&log_level);

    info!(version = VERSION, "Starting Ravo replication monitor");

    config.validate().context("invalid configuration")?;
    if matches.get_flag("check-config") {
        info!(
            tables = config.sync.tables.len(),
            poll_interval_seconds = config.global.poll_interval_seconds,
            "Configuration is valid"
        );
        return Ok(());
    }

    let aggregator = Arc::new(StatusAggregator::from_config(&config)?);

    if matches.get_flag("once") {
        let snapshot = aggregator.poll_once().await;
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let shutdown = CancellationToken::new();

    let poller = tokio::spawn(
        aggregator
            .clone()
            .run(config.poll_interval(), shutdown.clone()),
    );

    let listener = tokio::net::TcpListener::bind(config.server_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.server_addr()))?;
    let server = tokio::spawn(server::serve(listener, aggregator.clone(), shutdown.clone()));

    setup_shutdown_signal().await;
    info!("Shutdown signal received, stopping monitor...");
    shutdown.cancel();

    let grace = Duration::from_secs(config.global.shutdown_timeout_seconds);
    match tokio::time::timeout(grace, async { tokio::join!(poller, server) }).await {
        Ok((poller, server)) => {
            if let Err(e) = poller {
                error!(error = %e, "Poller task failed");
            }
            match server {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Dashboard API stopped with error"),
                Err(e) => error!(error = %e, "Dashboard API task failed"),
            }
        }
        Err(_) => warn!(timeout_seconds = grace.as_secs(), "Shutdown timed out"),
    }

    info!("Ravo replication monitor stopped");
    Ok(())
}

/// Initialize logging with the specified level
fn init_logging(log_level: &str) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => {
            eprintln!("Invalid log level: {}. Using 'info'", log_level);
            tracing::Level::INFO
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("ravo_monitor={},tower_http=info", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolve on Ctrl+C or SIGTERM
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

//! inspectd - Inspection line daemon
//!
//! Runs the detection cycle orchestrator against a simulated line:
//! - Mode controller and detection gate
//! - Dual-channel cycle tracking with the 2D grace window
//! - Structured logs for every cycle transition

use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod simulation;

use config::DaemonConfig;
use error::{DaemonError, DaemonResult};
use simulation::LineSimulation;

/// inspectd CLI
#[derive(Parser)]
#[command(name = "inspectd")]
#[command(about = "Inspection line daemon - dual-channel detection cycle orchestration", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "INSPECT_CONFIG")]
    config: Option<String>,

    /// Number of triggers to simulate (0 runs until interrupted)
    #[arg(long, env = "INSPECT_CYCLES")]
    cycles: Option<u64>,

    /// 2D grace window in milliseconds
    #[arg(long, env = "INSPECT_TIMEOUT_GRACE_MS")]
    timeout_grace_ms: Option<u64>,

    /// Run triggers in system test mode
    #[arg(long)]
    system_test: bool,

    /// Simulation RNG seed
    #[arg(long, env = "INSPECT_SEED")]
    seed: Option<u64>,

    /// Log level
    #[arg(long, env = "INSPECT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "INSPECT_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(cycles) = cli.cycles {
        config.simulation.cycles = cycles;
    }
    if let Some(grace) = cli.timeout_grace_ms {
        config.cycle.timeout_grace_ms = grace;
    }
    if let Some(seed) = cli.seed {
        config.simulation.seed = Some(seed);
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.simulation.system_test |= cli.system_test;
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        timeout_grace_ms = config.cycle.timeout_grace_ms,
        height_enabled = config.simulation.height_enabled,
        shielded = config.simulation.shielded,
        "Starting inspectd"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let simulation = LineSimulation::new(config.cycle, config.simulation)?;
    let report = simulation.run(shutdown_rx).await?;

    tracing::info!(
        triggers = report.triggers,
        rejected = report.rejected,
        judgements = report.judgements,
        degraded = report.degraded,
        fault_resets = report.fault_resets,
        missed = report.missed,
        duplicates = report.tracker.duplicates,
        judgement_failures = report.tracker.judgement_failures,
        "Line simulation finished"
    );
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, stopping line");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, stopping line");
        }
    }
}

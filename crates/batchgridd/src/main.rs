//! batchgridd — the Batchgrid daemon.
//!
//! Single binary that assembles the Batchgrid subsystems:
//! - Batch planner (prep/batch decisions, thread sizing, start delays)
//! - Capacity packer
//! - Scheduler polling loop
//! - Treasury (ROI-ranked upgrade purchasing)
//!
//! and drives them against an in-process simulated cluster.
//!
//! # Usage
//!
//! ```text
//! batchgridd simulate --config batchgrid.toml --cycles 30 --interval-ms 500
//! batchgridd config > batchgrid.toml
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use batchgrid_core::GridConfig;
use batchgrid_planner::{BatchPlanner, LinearAnalysis};
use batchgrid_scheduler::Scheduler;
use batchgrid_treasury::Treasury;
use batchgridd::{SimClock, SimCluster};

const DEFAULT_LOG_FILTER: &str = "info,batchgrid=debug";

#[derive(Parser)]
#[command(name = "batchgridd", about = "Batchgrid daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler and treasury against a simulated cluster.
    Simulate {
        /// Path to a batchgrid.toml configuration file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Stop after this many cycles (runs until Ctrl-C when omitted).
        #[arg(long)]
        cycles: Option<u64>,

        /// Override the configured poll interval, in milliseconds.
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Print the effective configuration as TOML.
    Config {
        /// Path to a batchgrid.toml configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Command::Simulate {
            config,
            cycles,
            interval_ms,
        } => run_simulation(config.as_deref(), cycles, interval_ms).await,
        Command::Config { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<GridConfig> {
    match path {
        Some(path) => {
            let config = GridConfig::from_file(path)?;
            info!(path = %path.display(), "configuration loaded");
            Ok(config)
        }
        None => Ok(GridConfig::default()),
    }
}

async fn run_simulation(
    config_path: Option<&Path>,
    cycles: Option<u64>,
    interval_ms: Option<u64>,
) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(ms) = interval_ms {
        config.scheduler.poll_interval_ms = ms;
    }
    config.validate()?;

    info!("batchgrid daemon starting in simulation mode");

    // ── Initialize subsystems ──────────────────────────────────

    let planner = BatchPlanner::new(
        config.planner.clone(),
        config.capacity.clone(),
        LinearAnalysis::default(),
    );
    info!(drain_mode = config.planner.drain_mode, "planner initialized");

    let treasury = Treasury::new(config.treasury.clone());
    info!(paused = treasury.is_paused(), "treasury initialized");

    let cluster = SimCluster::demo(&config, SimClock::wall());
    let mut scheduler = Scheduler::new(planner, treasury, cluster);

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    // ── Run ────────────────────────────────────────────────────

    let interval = Duration::from_millis(config.scheduler.poll_interval_ms);
    let ran = scheduler.run(interval, cycles, shutdown_rx).await;

    let summary = scheduler.cluster().summary();
    info!(cycles = ran, "batchgrid daemon stopped");
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

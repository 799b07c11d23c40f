//! ValutaTrade Hub Binary
//!
//! Interactive trading shell. Logs go to `<data_dir>/valuta.log` as JSON so
//! the terminal only shows command output.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use valuta_hub::{scheduler, HubConfig, Outcome, Repl, TradingHub};

#[derive(Parser, Debug)]
#[command(name = "valuta")]
#[command(about = "ValutaTrade Hub currency trading simulator")]
struct Args {
    /// Data directory (overrides VALUTA_DATA_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (overrides LOG_LEVEL)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = HubConfig::from_env();
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating {}", config.data_dir.display()))?;

    // Initialize logging
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_path())
        .with_context(|| format!("opening {}", config.log_path().display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .init();

    info!(config = ?config, "Starting ValutaTrade Hub");

    let hub = Arc::new(TradingHub::open(&config)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresher = scheduler::spawn(Arc::clone(&hub), &config.scheduler, shutdown_rx);

    println!("Welcome to ValutaTrade Hub. Type 'help' for commands.");

    let mut repl = Repl::new(Arc::clone(&hub));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{}", repl.prompt());
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                None
            }
        };

        let Some(line) = line else {
            println!();
            break;
        };

        match repl.execute(&line).await {
            Outcome::Output(text) if text.is_empty() => {}
            Outcome::Output(text) => println!("{text}"),
            Outcome::Exit => break,
        }
    }

    println!("Goodbye!");

    let _ = shutdown_tx.send(true);
    if let Some(handle) = refresher {
        if let Err(e) = handle.await {
            error!(error = %e, "Rate scheduler task failed");
        }
    }

    let metrics = hub.metrics();
    info!(
        trades_executed = metrics.trades_executed,
        trades_rejected = metrics.trades_rejected,
        refreshes_total = metrics.refreshes_total,
        refreshes_failed = metrics.refreshes_failed,
        source_failures = metrics.source_failures,
        "ValutaTrade Hub shutdown complete"
    );
    Ok(())
}

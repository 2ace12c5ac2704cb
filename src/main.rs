//! HoldemDecisionCore - Main Entry Point
//!
//! Runs the decision core over game states read from a JSON file and prints
//! one StrategyDecision per line.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use holdem_decision_core::config::load_config;
use holdem_decision_core::{create_health_channel, DecisionCore, GameState, SharedConfig};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", env = "DECISION_CONFIG")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// File holding one GameState or an array of them
    #[arg(long)]
    state: PathBuf,
}

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if args.json_logs {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn read_states(path: &PathBuf) -> Result<Vec<GameState>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw).context("parsing game state JSON")?;
    let states = match value {
        serde_json::Value::Array(_) => serde_json::from_value(value)?,
        single => vec![serde_json::from_value(single)?],
    };
    Ok(states)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    init_logging(&args)?;

    info!("Starting HoldemDecisionCore");
    info!("Configuration file: {}", args.config);

    let config = SharedConfig::new(load_config(Some(args.config.as_str()))?)?;
    let (health_tx, mut health_rx) = create_health_channel();
    tokio::spawn(async move {
        while let Some(event) = health_rx.recv().await {
            warn!(?event, "Health event");
        }
    });

    let core = DecisionCore::from_config(config, Some(health_tx))?;
    let states = read_states(&args.state)?;
    info!("Deciding {} states", states.len());

    for state in &states {
        let decision = core.decide(state).await;
        println!("{}", serde_json::to_string(&decision)?);
    }

    info!("Done");
    Ok(())
}

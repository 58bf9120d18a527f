//! Perp Gateway - Operational CLI
//!
//! Thin front end over the execution gateway: inspect the account, check
//! prices, and run a batch of trade intents produced by an upstream
//! decision engine.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use perp_gateway::config::Config;
use perp_gateway::executor::IntentExecutor;
use perp_gateway::venue::build_venue;
use perp_gateway::venue::types::TradeIntent;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Perp Gateway CLI
#[derive(Parser)]
#[command(name = "perp-gateway")]
#[command(version, about = "Multi-venue execution gateway for perpetual futures")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the account balance snapshot
    Balance,

    /// Show all open positions
    Positions,

    /// Show the current market price for a symbol
    Price {
        /// Symbol in normalized form (e.g. BTCUSDT)
        symbol: String,
    },

    /// Execute a batch of trade intents from a JSON file
    Execute {
        /// Path to a JSON array of trade intents
        #[arg(short, long)]
        intents: PathBuf,
    },

    /// Show completed orders reported by the venue
    History {
        /// Maximum number of records
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
}

fn init_tracing() -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::daily("logs", "gateway.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer),
        )
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_tracing();

    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    let venue = build_venue(&config)
        .await
        .context("failed to construct venue backend")?;
    info!(venue = %venue.venue(), "gateway ready");

    match cli.command {
        Commands::Balance => {
            let balance = venue.get_balance().await?;
            println!(
                "wallet: {}  available: {}  unrealized: {}  equity: {}",
                balance.wallet_balance,
                balance.available_balance,
                balance.unrealized_profit,
                balance.total_equity()
            );
        }

        Commands::Positions => {
            let positions = venue.get_positions().await?;
            if positions.is_empty() {
                println!("no open positions");
            }
            for p in positions {
                println!(
                    "{} {} qty={} entry={} mark={} lev={}x pnl={} liq={}",
                    p.symbol,
                    p.side,
                    p.quantity,
                    p.entry_price,
                    p.mark_price,
                    p.leverage,
                    p.unrealized_pnl,
                    p.liquidation_price
                );
            }
        }

        Commands::Price { symbol } => {
            let price = venue.get_market_price(&symbol).await?;
            println!("{symbol}: {price}");
        }

        Commands::Execute { intents } => {
            let raw = std::fs::read_to_string(&intents)
                .with_context(|| format!("failed to read {}", intents.display()))?;
            let batch: Vec<TradeIntent> =
                serde_json::from_str(&raw).context("failed to parse trade intents")?;
            info!(count = batch.len(), "loaded trade intents");

            let executor = IntentExecutor::new(venue, config.execution.action_pause());
            let outcomes = executor.execute_batch(batch).await;

            let mut failed = 0usize;
            for outcome in &outcomes {
                let status = if outcome.success { "ok" } else { "FAILED" };
                println!(
                    "{status:6} {} {} order_id={:?} {}",
                    outcome.symbol,
                    outcome.action,
                    outcome.order_id,
                    outcome.error.as_deref().unwrap_or("")
                );
                if !outcome.success {
                    failed += 1;
                }
            }
            if failed > 0 {
                error!(failed, total = outcomes.len(), "cycle finished with failures");
                std::process::exit(1);
            }
        }

        Commands::History { limit } => {
            let records = venue.get_order_history(None, None, limit).await?;
            if records.is_empty() {
                println!("no completed orders reported by this venue");
            }
            for r in records {
                println!(
                    "{} {} {} {} qty={} avg={} value={}",
                    r.order_id, r.symbol, r.side, r.order_type, r.executed_qty, r.avg_price, r.total_value
                );
            }
        }
    }

    Ok(())
}

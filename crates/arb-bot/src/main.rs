//! Spread arbitrage bot - entry point.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use rust_decimal::Decimal;
use tracing::info;

/// Cross-venue spread arbitrage bot
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via ARB_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Starting balance of the paper account, overriding the config file
    #[arg(long)]
    paper_balance: Option<Decimal>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    arb_telemetry::init_logging()?;

    info!("Starting arb-bot v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > ARB_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("ARB_CONFIG").ok())
        .unwrap_or_else(|| arb_bot::DEFAULT_CONFIG_PATH.to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = arb_bot::AppConfig::load(&config_path)?;
    info!(
        max_concurrent = config.scanner.max_concurrent,
        leverage = config.position.trading.leverage,
        order_amount_usd = %config.position.trading.order_amount_usd,
        "Configuration loaded"
    );

    let app = arb_bot::Application::new(
        config,
        Some(PathBuf::from(&config_path)),
        args.paper_balance,
    )?;
    app.run().await?;

    Ok(())
}

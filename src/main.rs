// perp-bot: rule-based perpetual-swap trading controller

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, Level};

use perp_trading_bot::config::Config;
use perp_trading_bot::core::TradingEngine;
use perp_trading_bot::exchange::{ExchangeClient, OkxClient};
use perp_trading_bot::journal::Journal;
use perp_trading_bot::notify::Notifier;

#[derive(Parser)]
#[command(name = "perp-bot")]
#[command(about = "Automated perpetual-futures trading bot", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file and exit
    Init,
    /// Run the trading engine
    Run,
    /// Print account balance and open positions
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    if let Err(e) = execute(cli).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Init => {
            let config = Config::default();
            config.save(&cli.config)?;
            info!("📝 wrote default configuration to {}", cli.config);
            info!("edit the [exchange] section with your API credentials before running");
            Ok(())
        }
        Commands::Run => {
            let config = Config::from_file(&cli.config)?;
            let client = Arc::new(OkxClient::new(&config.exchange)?);
            let notifier = Notifier::new(config.notify.webhook_url.clone());
            let journal = Journal::open(&config.journal.path)?;
            let engine = Arc::new(TradingEngine::new(config, client, notifier, journal));
            engine.run().await?;
            Ok(())
        }
        Commands::Status => {
            let config = Config::from_file(&cli.config)?;
            let client = OkxClient::new(&config.exchange)?;

            let balance = client.account_balance().await?;
            info!(
                equity = balance.equity,
                margin_used = balance.margin_used,
                "💰 account"
            );

            let positions = client.positions().await?;
            if positions.is_empty() {
                info!("no open positions");
            }
            for p in positions {
                info!(
                    symbol = %p.symbol,
                    direction = %p.direction,
                    size = p.size,
                    entry = p.entry_price,
                    mark = p.mark_price,
                    upl = p.unrealized_pnl,
                    "📍 position"
                );
            }
            Ok(())
        }
    }
}

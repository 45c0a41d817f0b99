//! Trader binary

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::{OrderId, Symbol};
use engine::{Advisor, GeminiAdvisor, GeminiConfig};
use feeds::{ExchangeGateway, WallexRestClient, WallexTradeStream};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use trader::telemetry::init_tracing;
use trader::{TraderConfig, TraderRuntime, run_check};

#[derive(Parser)]
#[command(name = "trader")]
#[command(about = "Single-symbol Wallex trader with stream/poll failover")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest trades and trade on advisory (default)
    Run,

    /// Check REST and stream connectivity
    Check {
        /// Seconds to wait for a streamed trade
        #[arg(long, default_value_t = 30)]
        stream_wait_secs: u64,
    },

    /// List markets
    Markets,

    /// Show the order book
    Depth {
        /// Market symbol (defaults to TRADE_SYMBOL)
        #[arg(long)]
        symbol: Option<String>,
    },

    /// List open orders
    OpenOrders {
        /// Narrow to one market
        #[arg(long)]
        symbol: Option<String>,
    },

    /// Cancel an order by id
    Cancel { order_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenv::dotenv().ok();
    init_tracing(cli.debug)?;

    let config = TraderConfig::from_env().context("Invalid configuration")?;
    info!("Loaded configuration: {:?}", config);

    let gateway = Arc::new(
        WallexRestClient::new(config.wallex.clone()).context("Failed to build REST client")?,
    );

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config, gateway).await,

        Commands::Check { stream_wait_secs } => {
            let mut stream = WallexTradeStream::new(config.wallex.clone());
            let report = run_check(
                gateway.as_ref(),
                &mut stream,
                &config.symbol,
                config.wallex.has_credentials(),
                Duration::from_secs(stream_wait_secs),
            )
            .await;
            print_json(&report)?;
            if !report.passed() {
                anyhow::bail!("Connectivity check failed");
            }
            Ok(())
        }

        Commands::Markets => print_json(&gateway.get_markets().await?),

        Commands::Depth { symbol } => {
            let symbol = symbol_or_default(symbol, &config)?;
            print_json(&gateway.get_depth(&symbol).await?)
        }

        Commands::OpenOrders { symbol } => {
            let symbol = symbol.as_deref().map(Symbol::parse).transpose()?;
            print_json(&gateway.get_open_orders(symbol.as_ref()).await?)
        }

        Commands::Cancel { order_id } => {
            let order_id = OrderId(order_id);
            gateway.cancel_order(&order_id).await?;
            info!("Cancelled order {}", order_id);
            Ok(())
        }
    }
}

async fn run(config: TraderConfig, gateway: Arc<WallexRestClient>) -> Result<()> {
    info!(
        "Starting trader v{} for {}",
        env!("CARGO_PKG_VERSION"),
        config.symbol
    );
    if config.dry_run {
        info!("DRY_RUN enabled: orders are logged, never sent");
    } else {
        warn!("LIVE trading enabled: orders will be submitted");
    }

    let advisor = build_advisor(&config)?;
    let stream = WallexTradeStream::new(config.wallex.clone());
    let runtime = TraderRuntime::new(config, gateway as Arc<dyn ExchangeGateway>, stream)
        .with_advisor(advisor);

    let report = runtime
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            info!("Received shutdown signal");
        })
        .await?;

    info!(
        "Trader stopped: {} trades, {} decision cycles, {} submitted, {} dry-run, {} failed",
        report.pipeline.trades,
        report.pipeline.cycles,
        report.pipeline.submitted,
        report.pipeline.dry_runs,
        report.pipeline.failed
    );
    Ok(())
}

fn build_advisor(config: &TraderConfig) -> Result<Option<Arc<dyn Advisor>>> {
    if !config.use_llm {
        info!("Advisory disabled (USE_LLM=false)");
        return Ok(None);
    }
    if !config.advisory_enabled() {
        warn!("USE_LLM is set but GEMINI_API_KEY is empty; advisory disabled");
        return Ok(None);
    }
    let advisor = GeminiAdvisor::new(GeminiConfig::new(
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
    ))
    .context("Failed to build advisory client")?;
    info!("Advisory: Gemini model {}", config.gemini_model);
    let advisor: Arc<dyn Advisor> = Arc::new(advisor);
    Ok(Some(advisor))
}

fn symbol_or_default(symbol: Option<String>, config: &TraderConfig) -> Result<Symbol> {
    match symbol {
        Some(raw) => Ok(Symbol::parse(&raw)?),
        None => Ok(config.symbol.clone()),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

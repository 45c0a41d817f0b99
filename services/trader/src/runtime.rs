//! Task wiring for one trading session
//!
//! ```text
//! StreamConnector ---\
//!                     +--> TradeRouter --mpsc--> DecisionPipeline --> gateway
//! PollingFallback ---/
//!        ^
//!   FailoverMonitor
//! ```
//!
//! Producers stop on the shutdown signal. The pipeline then drains whatever
//! the router already delivered and exits when the channel closes.

use crate::config::TraderConfig;
use anyhow::{Context, Result, bail};
use common::constants::buffers::TRADE_CHANNEL_SIZE;
use common::{Symbol, shutdown_channel};
use engine::{Advisor, DecisionPipeline, PipelineConfig, PipelineSummary};
use feeds::{
    ConnectorConfig, ExchangeGateway, FailoverMonitor, MonitorConfig, PollerConfig,
    PollingFallback, RouterCounts, StreamConnector, TradeRouter, TradeSource, Watermark,
};
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Counters collected when a session ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub router: RouterCounts,
    pub pipeline: PipelineSummary,
    pub reconnects: u64,
}

/// Confirm `symbol` is listed and tradable; returns the effective minimum
/// order quantity.
///
/// An unreachable listing only warns. A reachable listing without the symbol
/// is fatal.
pub async fn startup_check<G: ExchangeGateway + ?Sized>(
    gateway: &G,
    symbol: &Symbol,
    configured_min: Decimal,
) -> Result<Decimal> {
    let markets = match gateway.get_markets().await {
        Ok(markets) => markets,
        Err(e) => {
            warn!("Market listing unavailable, skipping symbol check: {}", e);
            return Ok(configured_min);
        }
    };

    let Some(market) = markets
        .iter()
        .find(|m| m.symbol.eq_ignore_ascii_case(symbol.as_str()))
    else {
        bail!(
            "Symbol {} is not listed ({} markets checked)",
            symbol,
            markets.len()
        );
    };
    if !market.tradable {
        bail!("Symbol {} is listed but not tradable", symbol);
    }

    let effective = market
        .min_qty
        .map_or(configured_min, |listed| listed.max(configured_min));
    info!(
        "Market {} listed (min quantity {}, effective {})",
        symbol,
        market
            .min_qty
            .map_or_else(|| "n/a".to_string(), |q| q.to_string()),
        effective
    );
    Ok(effective)
}

/// Builder for one session
pub struct TraderRuntime<S: TradeSource + 'static> {
    config: TraderConfig,
    gateway: Arc<dyn ExchangeGateway>,
    source: S,
    advisor: Option<Arc<dyn Advisor>>,
    watermark: Watermark,
}

impl<S: TradeSource + 'static> TraderRuntime<S> {
    pub fn new(config: TraderConfig, gateway: Arc<dyn ExchangeGateway>, source: S) -> Self {
        Self {
            config,
            gateway,
            source,
            advisor: None,
            watermark: Watermark::starting_now(),
        }
    }

    #[must_use]
    pub fn with_advisor(mut self, advisor: Option<Arc<dyn Advisor>>) -> Self {
        self.advisor = advisor;
        self
    }

    /// Replace the default start-of-session watermark
    #[must_use]
    pub fn with_watermark(mut self, watermark: Watermark) -> Self {
        self.watermark = watermark;
        self
    }

    /// Run until `stop` resolves, then shut down and report
    pub async fn run<F>(self, stop: F) -> Result<RunReport>
    where
        F: Future<Output = ()>,
    {
        let Self {
            config,
            gateway,
            source,
            advisor,
            watermark,
        } = self;

        let min_quantity = startup_check(gateway.as_ref(), &config.symbol, config.min_order_qty)
            .await
            .context("Startup market check failed")?;

        if advisor.is_none() {
            warn!("No advisory configured; trades are ingested but no orders are decided");
        }
        info!(
            "Trading {} with budget {} (dry_run={}, polling={})",
            config.symbol, config.budget, config.dry_run, config.enable_polling
        );

        let (trigger, shutdown) = shutdown_channel();
        let (trade_tx, trade_rx) = mpsc::channel(TRADE_CHANNEL_SIZE);
        let router = Arc::new(TradeRouter::new(
            config.symbol.clone(),
            watermark,
            trade_tx,
        ));

        let mut pipeline_config = PipelineConfig::new(
            config.symbol.clone(),
            config.budget,
            min_quantity,
            config.dry_run,
        );
        pipeline_config.advisory_every = config.advisory_every;
        pipeline_config.advisory_timeout = config.advisory_timeout;
        let pipeline = DecisionPipeline::new(pipeline_config, advisor, Arc::clone(&gateway));
        let pipeline_task = tokio::spawn(pipeline.run(trade_rx));

        let connector = StreamConnector::new(
            source,
            ConnectorConfig::new(config.symbol.clone(), config.idle_timeout),
            Arc::clone(&router),
        );
        let status = connector.status();
        let monitor = FailoverMonitor::new(Arc::clone(&status), MonitorConfig::new(config.idle_timeout));
        let poll_mode = monitor.subscribe();

        let mut producers: Vec<(&'static str, JoinHandle<()>)> = vec![
            ("stream connector", tokio::spawn(connector.run(shutdown.clone()))),
            ("failover monitor", tokio::spawn(monitor.run(shutdown.clone()))),
        ];
        if config.enable_polling {
            let poller = PollingFallback::new(
                Arc::clone(&gateway),
                Arc::clone(&router),
                PollerConfig::new(config.symbol.clone(), config.polling_interval),
            );
            producers.push((
                "polling fallback",
                tokio::spawn(poller.run(poll_mode, shutdown.clone())),
            ));
        } else {
            info!("Polling fallback disabled");
        }

        stop.await;
        info!("Shutting down");
        trigger.trigger();

        for (name, handle) in producers {
            if let Err(e) = handle.await {
                error!("{} task failed: {}", name, e);
            }
        }

        let router_counts = router.counts();
        drop(router);
        let pipeline_summary = pipeline_task.await.context("Decision pipeline task failed")?;

        let report = RunReport {
            router: router_counts,
            pipeline: pipeline_summary,
            reconnects: status.reconnects(),
        };
        info!(
            "Session ended: {} accepted ({} stream, {} poll), {} stale, {} duplicate, {} reconnects",
            report.router.accepted,
            report.router.from_stream,
            report.router.from_poll,
            report.router.stale,
            report.router.duplicate,
            report.reconnects
        );
        Ok(report)
    }
}

//! Trade consumption path: window, periodic advisory, decision, execution

use crate::advisory::{Advisor, MarketState, consult};
use crate::decision::{DecisionEngine, ExecutionOutcome};
use common::constants::buffers::{ADVISORY_TRADE_SAMPLE, RECENT_TRADES_WINDOW};
use common::{Symbol, Trade};
use feeds::ExchangeGateway;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub symbol: Symbol,
    /// Quote amount spent per order
    pub budget: Decimal,
    pub min_quantity: Decimal,
    pub dry_run: bool,
    /// Consult the advisor after every this many accepted trades
    pub advisory_every: u64,
    pub advisory_timeout: Duration,
    /// Trades kept for the advisor
    pub window: usize,
}

impl PipelineConfig {
    #[must_use]
    pub fn new(symbol: Symbol, budget: Decimal, min_quantity: Decimal, dry_run: bool) -> Self {
        Self {
            symbol,
            budget,
            min_quantity,
            dry_run,
            advisory_every: 6,
            advisory_timeout: Duration::from_secs(20),
            window: RECENT_TRADES_WINDOW,
        }
    }
}

/// Counters reported when the pipeline stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub trades: u64,
    pub cycles: u64,
    pub submitted: u64,
    pub dry_runs: u64,
    pub failed: u64,
}

pub struct DecisionPipeline {
    config: PipelineConfig,
    engine: DecisionEngine,
    advisor: Option<Arc<dyn Advisor>>,
    gateway: Arc<dyn ExchangeGateway>,
    recent: VecDeque<Trade>,
    summary: PipelineSummary,
}

impl DecisionPipeline {
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        advisor: Option<Arc<dyn Advisor>>,
        gateway: Arc<dyn ExchangeGateway>,
    ) -> Self {
        let engine = DecisionEngine::new(config.symbol.clone(), config.dry_run);
        let window = config.window.max(1);
        Self {
            config,
            engine,
            advisor,
            gateway,
            recent: VecDeque::with_capacity(window),
            summary: PipelineSummary::default(),
        }
    }

    #[must_use]
    pub fn summary(&self) -> PipelineSummary {
        self.summary
    }

    /// Record one delivered trade; every K-th trade runs a decision cycle
    pub async fn on_trade(&mut self, trade: Trade) -> Option<ExecutionOutcome> {
        if self.recent.len() >= self.config.window.max(1) {
            self.recent.pop_front();
        }
        self.recent.push_back(trade);
        self.summary.trades += 1;

        let every = self.config.advisory_every.max(1);
        if self.summary.trades % every != 0 {
            return None;
        }
        let Some(advisor) = self.advisor.clone() else {
            debug!("Advisory disabled; skipping decision cycle");
            return None;
        };
        self.cycle(advisor.as_ref()).await
    }

    async fn cycle(&mut self, advisor: &dyn Advisor) -> Option<ExecutionOutcome> {
        let last = self.recent.back()?.clone();
        self.summary.cycles += 1;

        let market = MarketState {
            symbol: self.config.symbol.clone(),
            last_price: last.price,
            last_ts: last.ts,
            trades_seen: self.summary.trades,
        };
        let trades = self.recent.make_contiguous();
        let sample = &trades[trades.len().saturating_sub(ADVISORY_TRADE_SAMPLE)..];

        let recommendation =
            consult(advisor, sample, &market, self.config.advisory_timeout).await;
        info!(
            "Decision cycle {} at price {}: {} ({:.2})",
            self.summary.cycles, last.price, recommendation.action, recommendation.confidence
        );

        let outcome = self
            .engine
            .run_cycle(
                &recommendation,
                self.config.budget,
                last.price,
                self.config.min_quantity,
                self.gateway.as_ref(),
            )
            .await;
        match &outcome {
            Some(ExecutionOutcome::Submitted(_)) => self.summary.submitted += 1,
            Some(ExecutionOutcome::DryRun) => self.summary.dry_runs += 1,
            Some(ExecutionOutcome::Failed(_)) => self.summary.failed += 1,
            None => {}
        }
        outcome
    }

    /// Consume trades until every sender is gone
    pub async fn run(mut self, mut rx: mpsc::Receiver<Trade>) -> PipelineSummary {
        info!(
            "Decision pipeline started (advisory every {} trades, dry_run={})",
            self.config.advisory_every, self.config.dry_run
        );
        while let Some(trade) = rx.recv().await {
            self.on_trade(trade).await;
        }
        let summary = self.summary;
        info!(
            "Decision pipeline stopped: {} trades, {} cycles, {} submitted, {} dry-run, {} failed",
            summary.trades, summary.cycles, summary.submitted, summary.dry_runs, summary.failed
        );
        summary
    }
}

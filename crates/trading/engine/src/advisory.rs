//! Advisory signal interface
//!
//! An [`Advisor`] turns recent trades into a [`Recommendation`]. Advisors are
//! external and unreliable; [`consult`] bounds each call and substitutes a
//! flat recommendation on any failure, so the trade path never sees an error.

use common::{Symbol, Trade, Ts};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Recommended action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[serde(alias = "long", alias = "BUY", alias = "LONG")]
    Buy,
    #[serde(alias = "short", alias = "SELL", alias = "SHORT")]
    Sell,
    #[serde(alias = "FLAT", alias = "hold", alias = "HOLD")]
    Flat,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Flat => "flat",
        })
    }
}

/// Advisory output for one decision cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: Action,
    /// 0.0 ..= 1.0
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, alias = "reason")]
    pub rationale: String,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
}

impl Recommendation {
    #[must_use]
    pub fn new(action: Action, confidence: f64, rationale: impl Into<String>) -> Self {
        Self {
            action,
            confidence: confidence.clamp(0.0, 1.0),
            rationale: rationale.into(),
            stop_loss: None,
            take_profit: None,
        }
    }

    /// Safe default: do nothing
    #[must_use]
    pub fn flat(reason: impl Into<String>) -> Self {
        Self::new(Action::Flat, 0.0, reason)
    }
}

/// Snapshot of the market handed to the advisor with the trades
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketState {
    pub symbol: Symbol,
    pub last_price: Decimal,
    pub last_ts: Ts,
    /// Trades accepted since startup
    pub trades_seen: u64,
}

/// Advisory errors
#[derive(Debug, Error)]
pub enum AdvisoryError {
    #[error("Advisory transport error: {0}")]
    Transport(reqwest::Error),

    #[error("Advisory returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Advisory timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed advisory output: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for AdvisoryError {
    /// Request URLs may carry credentials; never keep them in the error
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.without_url())
    }
}

/// Pluggable recommendation source
#[async_trait::async_trait]
pub trait Advisor: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(
        &self,
        trades: &[Trade],
        market: &MarketState,
    ) -> Result<Recommendation, AdvisoryError>;
}

/// Call `advisor` with a deadline; any failure becomes a flat recommendation
pub async fn consult(
    advisor: &dyn Advisor,
    trades: &[Trade],
    market: &MarketState,
    deadline: Duration,
) -> Recommendation {
    let outcome = match tokio::time::timeout(deadline, advisor.analyze(trades, market)).await {
        Ok(result) => result,
        Err(_) => Err(AdvisoryError::Timeout(deadline)),
    };
    match outcome {
        Ok(rec) => {
            debug!(
                "{} advised {} ({:.2}): {}",
                advisor.name(),
                rec.action,
                rec.confidence,
                rec.rationale
            );
            rec
        }
        Err(e) => {
            warn!("Advisory {} failed, treating as flat: {}", advisor.name(), e);
            Recommendation::flat(format!("advisory failure: {e}"))
        }
    }
}

/// Advisor returning a fixed recommendation, optionally after a delay
#[derive(Debug, Clone)]
pub struct FixedAdvisor {
    recommendation: Recommendation,
    delay: Duration,
}

impl FixedAdvisor {
    #[must_use]
    pub fn new(recommendation: Recommendation) -> Self {
        Self {
            recommendation,
            delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait::async_trait]
impl Advisor for FixedAdvisor {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn analyze(
        &self,
        _trades: &[Trade],
        _market: &MarketState,
    ) -> Result<Recommendation, AdvisoryError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.recommendation.clone())
    }
}

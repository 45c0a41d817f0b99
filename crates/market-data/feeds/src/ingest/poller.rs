//! REST polling fallback
//!
//! While the monitor signals [`PollMode::On`], fetches trades newer than the
//! watermark and hands them to the router. The router still decides what is
//! new; the poller only narrows the request.

use crate::common::gateway::{ExchangeGateway, GatewayError};
use crate::ingest::monitor::PollMode;
use crate::ingest::router::TradeRouter;
use common::constants::network::MIN_POLL_INTERVAL_MS;
use common::{Origin, Shutdown, Symbol};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub symbol: Symbol,
    /// Delay between polls after a cycle with no new trades
    pub interval: Duration,
}

impl PollerConfig {
    #[must_use]
    pub fn new(symbol: Symbol, interval: Duration) -> Self {
        Self { symbol, interval }
    }

    /// Interval with the one-second floor applied
    #[must_use]
    pub fn effective_interval(&self) -> Duration {
        self.interval.max(Duration::from_millis(MIN_POLL_INTERVAL_MS))
    }

    /// Delay before the next poll: half the interval after a productive
    /// cycle, never below the floor
    #[must_use]
    pub fn next_delay(&self, accepted: usize) -> Duration {
        let interval = self.effective_interval();
        if accepted == 0 {
            interval
        } else {
            (interval / 2).max(Duration::from_millis(MIN_POLL_INTERVAL_MS))
        }
    }
}

/// Result of one poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Trades returned by the gateway
    pub fetched: usize,
    /// Trades the router delivered as new
    pub accepted: usize,
}

pub struct PollingFallback<G: ExchangeGateway + ?Sized> {
    gateway: Arc<G>,
    router: Arc<TradeRouter>,
    config: PollerConfig,
}

impl<G: ExchangeGateway + ?Sized> PollingFallback<G> {
    #[must_use]
    pub fn new(gateway: Arc<G>, router: Arc<TradeRouter>, config: PollerConfig) -> Self {
        Self {
            gateway,
            router,
            config,
        }
    }

    /// Fetch trades newer than the watermark and route them in order
    pub async fn poll_once(&self) -> Result<PollReport, GatewayError> {
        let since = self.router.watermark().get();
        let mut trades = self
            .gateway
            .get_trades(&self.config.symbol, Some(since))
            .await?;
        let fetched = trades.len();

        trades.retain(|t| t.ts > since);
        trades.sort_by_key(|t| t.ts);

        let mut accepted = 0;
        for trade in trades {
            if self.router.accept(trade, Origin::Poll).await {
                accepted += 1;
            }
        }
        Ok(PollReport { fetched, accepted })
    }

    /// Poll while the signal is on, until shutdown.
    ///
    /// Fetch failures are logged and retried at the next tick.
    pub async fn run(self, mut mode: watch::Receiver<PollMode>, mut shutdown: Shutdown) {
        info!(
            "Polling fallback enabled: interval={:?}",
            self.config.effective_interval()
        );

        loop {
            let paused = *mode.borrow_and_update() == PollMode::Off;
            if paused {
                debug!("Polling paused while stream is live");
                let resumed = tokio::select! {
                    res = mode.wait_for(|m| *m == PollMode::On) => res.is_ok(),
                    () = shutdown.wait() => false,
                };
                if !resumed {
                    break;
                }
            }
            if shutdown.is_triggered() {
                break;
            }

            let delay = match self.poll_once().await {
                Ok(report) => {
                    info!(
                        "Polling fetched {} new trades (total candidates={})",
                        report.accepted, report.fetched
                    );
                    self.config.next_delay(report.accepted)
                }
                Err(e) => {
                    warn!("Polling trades failed: {}", e);
                    self.config.effective_interval()
                }
            };

            let slept = tokio::select! {
                () = sleep(delay) => true,
                () = shutdown.wait() => false,
            };
            if !slept {
                break;
            }
        }
        info!("Polling fallback stopped");
    }
}

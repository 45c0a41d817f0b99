//! Connectivity check against the exchange

use anyhow::Result;
use common::{Symbol, Trade};
use feeds::{ExchangeGateway, TradeSource};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};

/// Outcome of one probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Probe {
    Ok { detail: String },
    Failed { error: String },
    Skipped { reason: String },
}

impl Probe {
    fn ok(detail: impl Into<String>) -> Self {
        Self::Ok {
            detail: detail.into(),
        }
    }

    fn failed(error: impl ToString) -> Self {
        Self::Failed {
            error: error.to_string(),
        }
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub symbol: String,
    pub markets: Probe,
    pub trades: Probe,
    pub depth: Probe,
    pub open_orders: Probe,
    pub stream: Probe,
}

impl CheckReport {
    /// No probe failed
    #[must_use]
    pub fn passed(&self) -> bool {
        ![
            &self.markets,
            &self.trades,
            &self.depth,
            &self.open_orders,
            &self.stream,
        ]
        .iter()
        .any(|p| p.is_failed())
    }
}

/// Probe every REST call once and wait up to `stream_wait` for a streamed trade.
///
/// Open orders are skipped without credentials.
pub async fn run_check<G, S>(
    gateway: &G,
    source: &mut S,
    symbol: &Symbol,
    has_credentials: bool,
    stream_wait: Duration,
) -> CheckReport
where
    G: ExchangeGateway + ?Sized,
    S: TradeSource,
{
    let markets = match gateway.get_markets().await {
        Ok(markets) => {
            let listed = markets
                .iter()
                .any(|m| m.symbol.eq_ignore_ascii_case(symbol.as_str()));
            if listed {
                Probe::ok(format!("{} markets, {} listed", markets.len(), symbol))
            } else {
                Probe::failed(format!("{} not among {} markets", symbol, markets.len()))
            }
        }
        Err(e) => Probe::failed(e),
    };

    let trades = match gateway.get_trades(symbol, None).await {
        Ok(trades) => match trades.last() {
            Some(last) => Probe::ok(format!(
                "{} recent trades, last {} @ {}",
                trades.len(),
                last.quantity,
                last.price
            )),
            None => Probe::ok("no recent trades"),
        },
        Err(e) => Probe::failed(e),
    };

    let depth = match gateway.get_depth(symbol).await {
        Ok(book) => Probe::ok(format!(
            "{} bids / {} asks, best bid {}, best ask {}",
            book.bids.len(),
            book.asks.len(),
            book.best_bid()
                .map_or_else(|| "-".to_string(), |l| l.price.to_string()),
            book.best_ask()
                .map_or_else(|| "-".to_string(), |l| l.price.to_string()),
        )),
        Err(e) => Probe::failed(e),
    };

    let open_orders = if has_credentials {
        match gateway.get_open_orders(Some(symbol)).await {
            Ok(orders) => Probe::ok(format!("{} open orders", orders.len())),
            Err(e) => Probe::failed(e),
        }
    } else {
        Probe::Skipped {
            reason: "no API key".to_string(),
        }
    };

    let stream = match first_streamed_trade(source, symbol, stream_wait).await {
        Ok(Some(trade)) => Probe::ok(format!(
            "trade {} @ {} at {}",
            trade.quantity, trade.price, trade.ts
        )),
        Ok(None) => Probe::failed(format!("no trade streamed within {stream_wait:?}")),
        Err(e) => Probe::failed(format!("{e:#}")),
    };

    let report = CheckReport {
        symbol: symbol.to_string(),
        markets,
        trades,
        depth,
        open_orders,
        stream,
    };
    if report.passed() {
        info!("Connectivity check passed for {}", symbol);
    } else {
        warn!("Connectivity check failed for {}", symbol);
    }
    report
}

async fn first_streamed_trade<S: TradeSource>(
    source: &mut S,
    symbol: &Symbol,
    wait: Duration,
) -> Result<Option<Trade>> {
    source.connect().await?;
    let (tx, mut rx) = mpsc::channel(16);

    let outcome = timeout(wait, async {
        source.subscribe(symbol).await?;
        let streamed = tokio::select! {
            res = source.run(tx) => {
                res?;
                None
            }
            trade = rx.recv() => trade,
        };
        Ok::<_, anyhow::Error>(streamed.or_else(|| rx.try_recv().ok()))
    })
    .await;

    if let Err(e) = source.disconnect().await {
        warn!("Disconnect after check failed: {}", e);
    }
    match outcome {
        Ok(result) => result,
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feeds::testing::{ScriptStep, ScriptedTradeSource, StubGateway, test_symbol, trade};
    use feeds::MarketInfo;

    fn listed_gateway() -> StubGateway {
        let gateway = StubGateway::with_trades(vec![trade(1, 100)]);
        gateway.set_markets(vec![MarketInfo {
            symbol: "BTCUSDT".to_string(),
            base_asset: Some("BTC".to_string()),
            quote_asset: Some("USDT".to_string()),
            min_qty: None,
            tradable: true,
        }]);
        gateway
    }

    #[tokio::test]
    async fn test_check_passes_with_streamed_trade() {
        let gateway = listed_gateway();
        let (mut source, handle) =
            ScriptedTradeSource::new(vec![ScriptStep::Trade(trade(2, 101))]);

        let report = run_check(
            &gateway,
            &mut source,
            &test_symbol(),
            false,
            Duration::from_secs(5),
        )
        .await;

        assert!(report.passed(), "{report:?}");
        assert!(matches!(report.open_orders, Probe::Skipped { .. }));
        assert_eq!(handle.subscriptions(), vec!["BTCUSDT".to_string()]);
        assert_eq!(handle.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_stream_fails_check() {
        let gateway = listed_gateway();
        let (mut source, _handle) = ScriptedTradeSource::new(Vec::new());

        let report = run_check(
            &gateway,
            &mut source,
            &test_symbol(),
            true,
            Duration::from_secs(30),
        )
        .await;

        assert!(matches!(report.open_orders, Probe::Ok { .. }));
        assert!(report.stream.is_failed());
        assert!(!report.passed());
    }

    #[tokio::test]
    async fn test_unlisted_symbol_fails_markets_probe() {
        let gateway = StubGateway::new();
        let (mut source, _handle) =
            ScriptedTradeSource::new(vec![ScriptStep::Trade(trade(2, 101))]);

        let report = run_check(
            &gateway,
            &mut source,
            &test_symbol(),
            false,
            Duration::from_secs(5),
        )
        .await;

        assert!(report.markets.is_failed());
        assert!(!report.stream.is_failed());
    }
}

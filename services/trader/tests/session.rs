//! End-to-end sessions over the in-memory gateway and a scripted stream

use common::Ts;
use engine::{Action, Advisor, FixedAdvisor, Recommendation};
use feeds::testing::{ScriptStep, ScriptedTradeSource, StubGateway, trade, trade_with_id};
use feeds::{ExchangeGateway, MarketInfo, Watermark};
use pretty_assertions::assert_eq;
use rstest::{fixture, rstest};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use trader::{TraderConfig, TraderRuntime};

fn config(pairs: &[(&str, &str)]) -> TraderConfig {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    TraderConfig::from_lookup(|key| map.get(key).cloned()).unwrap()
}

#[fixture]
fn gateway() -> Arc<StubGateway> {
    let gateway = StubGateway::new();
    gateway.set_markets(vec![MarketInfo {
        symbol: "BTCUSDT".to_string(),
        base_asset: Some("BTC".to_string()),
        quote_asset: Some("USDT".to_string()),
        min_qty: None,
        tradable: true,
    }]);
    Arc::new(gateway)
}

fn buy_advisor() -> Option<Arc<dyn Advisor>> {
    let advisor: Arc<dyn Advisor> = Arc::new(FixedAdvisor::new(Recommendation::new(
        Action::Buy,
        0.9,
        "trend",
    )));
    Some(advisor)
}

fn rising_trades() -> Vec<ScriptStep> {
    vec![
        ScriptStep::Trade(trade(1, 100)),
        ScriptStep::Trade(trade(2, 101)),
        ScriptStep::Trade(trade(3, 102)),
    ]
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_third_trade_places_one_live_order(gateway: Arc<StubGateway>) {
    let (source, _handle) = ScriptedTradeSource::new(rising_trades());
    let config = config(&[
        ("DRY_RUN", "false"),
        ("WALLEX_API_KEY", "k"),
        ("ADVISORY_EVERY_N_TRADES", "3"),
        ("ENABLE_POLLING", "false"),
    ]);

    let observed = Arc::clone(&gateway);
    let report = TraderRuntime::new(config, gateway.clone() as Arc<dyn ExchangeGateway>, source)
        .with_advisor(buy_advisor())
        .with_watermark(Watermark::new(Ts::ZERO))
        .run(async move {
            for _ in 0..500 {
                if !observed.placed_orders().is_empty() {
                    break;
                }
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

    let placed = gateway.placed_orders();
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].quantity, Decimal::from_str("0.098039").unwrap());
    assert_eq!(placed[0].symbol.as_str(), "BTCUSDT");
    assert_eq!(report.router.accepted, 3);
    assert_eq!(report.pipeline.cycles, 1);
    assert_eq!(report.pipeline.submitted, 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_dry_run_never_reaches_gateway(gateway: Arc<StubGateway>) {
    let (source, _handle) = ScriptedTradeSource::new(rising_trades());
    let config = config(&[("ADVISORY_EVERY_N_TRADES", "3"), ("ENABLE_POLLING", "false")]);

    let report = TraderRuntime::new(config, gateway.clone() as Arc<dyn ExchangeGateway>, source)
        .with_advisor(buy_advisor())
        .with_watermark(Watermark::new(Ts::ZERO))
        .run(sleep(Duration::from_secs(2)))
        .await
        .unwrap();

    assert_eq!(report.pipeline.dry_runs, 1);
    assert_eq!(gateway.place_calls(), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_poll_backfill_and_stream_are_deduplicated(gateway: Arc<StubGateway>) {
    // Stream goes quiet after three trades, then replays one old and one
    // already-polled trade before a new one.
    let (source, _handle) = ScriptedTradeSource::new(vec![
        ScriptStep::Trade(trade_with_id(1, 100, "t1")),
        ScriptStep::Trade(trade_with_id(2, 101, "t2")),
        ScriptStep::Trade(trade_with_id(3, 102, "t3")),
        ScriptStep::Pause(Duration::from_secs(6)),
        ScriptStep::Trade(trade_with_id(3, 102, "t3")),
        ScriptStep::Trade(trade_with_id(4, 103, "t4")),
        ScriptStep::Trade(trade_with_id(5, 104, "t5")),
    ]);
    let config = config(&[
        ("ENABLE_POLLING", "true"),
        ("POLLING_INTERVAL_SEC", "1"),
        ("WS_IDLE_TIMEOUT_SEC", "2"),
    ]);

    let feed = Arc::clone(&gateway);
    let report = TraderRuntime::new(config, gateway.clone() as Arc<dyn ExchangeGateway>, source)
        .with_watermark(Watermark::new(Ts::ZERO))
        .run(async move {
            sleep(Duration::from_millis(500)).await;
            feed.set_trades(vec![
                trade_with_id(1, 100, "t1"),
                trade_with_id(2, 101, "t2"),
                trade_with_id(3, 102, "t3"),
                trade_with_id(4, 103, "t4"),
            ]);
            sleep(Duration::from_secs(10)).await;
        })
        .await
        .unwrap();

    assert_eq!(report.router.accepted, 5);
    assert_eq!(report.router.from_poll, 1);
    assert_eq!(report.router.from_stream, 4);
    assert_eq!(report.router.stale, 1);
    assert_eq!(report.router.duplicate, 1);
    assert_eq!(report.pipeline.trades, 5);
    assert!(gateway.trade_calls() >= 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_unlisted_symbol_aborts_startup() {
    let gateway = Arc::new(StubGateway::new());
    gateway.set_markets(vec![MarketInfo {
        symbol: "ETHUSDT".to_string(),
        base_asset: None,
        quote_asset: None,
        min_qty: None,
        tradable: true,
    }]);
    let (source, handle) = ScriptedTradeSource::new(rising_trades());

    let result = TraderRuntime::new(
        config(&[]),
        gateway.clone() as Arc<dyn ExchangeGateway>,
        source,
    )
    .with_advisor(buy_advisor())
    .run(sleep(Duration::from_secs(1)))
    .await;

    assert!(result.is_err());
    assert_eq!(handle.connects(), 0);
    assert_eq!(gateway.place_calls(), 0);
}

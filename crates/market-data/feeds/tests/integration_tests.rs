//! Polling path against a mocked Wallex REST API

use common::{Origin, Symbol, Trade, Ts};
use feeds::{PollerConfig, PollingFallback, TradeRouter, WallexConfig, WallexRestClient, Watermark};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn btc() -> Symbol {
    Symbol::parse("BTCUSDT").unwrap()
}

fn wallex_trade(id: &str, ts_ms: u64, price: &str) -> Value {
    json!({
        "symbol": "BTCUSDT",
        "id": id,
        "price": price,
        "quantity": "0.5",
        "isBuyOrder": true,
        "timestamp": ts_ms,
    })
}

async fn serve_trades(server: &MockServer, trades: Vec<Value>) {
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/v1/trades"))
        .and(query_param("symbol", "BTCUSDT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "result": {"latestTrades": trades}
        })))
        .mount(server)
        .await;
}

fn poller(
    server: &MockServer,
) -> (
    PollingFallback<WallexRestClient>,
    Arc<TradeRouter>,
    mpsc::Receiver<Trade>,
) {
    let gateway = Arc::new(WallexRestClient::new(WallexConfig::new(server.uri(), "")).unwrap());
    let (tx, rx) = mpsc::channel(64);
    let router = Arc::new(TradeRouter::new(btc(), Watermark::new(Ts::ZERO), tx));
    let poller = PollingFallback::new(
        gateway,
        Arc::clone(&router),
        PollerConfig::new(btc(), Duration::from_secs(5)),
    );
    (poller, router, rx)
}

fn drain(rx: &mut mpsc::Receiver<Trade>) -> Vec<Option<String>> {
    let mut ids = Vec::new();
    while let Ok(trade) = rx.try_recv() {
        ids.push(trade.trade_id);
    }
    ids
}

#[tokio::test]
async fn test_repeated_polls_deliver_each_trade_once() {
    let server = MockServer::start().await;
    serve_trades(
        &server,
        vec![
            wallex_trade("3", 1_700_000_003_000, "103"),
            wallex_trade("1", 1_700_000_001_000, "101"),
            wallex_trade("2", 1_700_000_002_000, "102"),
        ],
    )
    .await;
    let (poller, router, mut rx) = poller(&server);

    let first = poller.poll_once().await.unwrap();
    assert_eq!((first.fetched, first.accepted), (3, 3));
    let second = poller.poll_once().await.unwrap();
    assert_eq!((second.fetched, second.accepted), (0, 0));

    assert_eq!(
        drain(&mut rx),
        vec![Some("1".to_string()), Some("2".to_string()), Some("3".to_string())]
    );
    assert_eq!(router.watermark().get(), Ts::from_millis(1_700_000_003_000));

    serve_trades(
        &server,
        vec![
            wallex_trade("3", 1_700_000_003_000, "103"),
            wallex_trade("4", 1_700_000_004_000, "104"),
        ],
    )
    .await;
    let third = poller.poll_once().await.unwrap();
    assert_eq!(third.accepted, 1);
    assert_eq!(drain(&mut rx), vec![Some("4".to_string())]);
}

#[tokio::test]
async fn test_poll_skips_what_the_stream_already_delivered() {
    let server = MockServer::start().await;
    serve_trades(
        &server,
        vec![
            wallex_trade("1", 1_700_000_001_000, "101"),
            wallex_trade("2", 1_700_000_002_000, "102"),
            wallex_trade("3", 1_700_000_003_000, "103"),
        ],
    )
    .await;
    let (poller, router, mut rx) = poller(&server);

    let streamed = Trade {
        symbol: btc(),
        price: Decimal::from(102),
        quantity: Decimal::new(5, 1),
        side: None,
        ts: Ts::from_millis(1_700_000_002_000),
        trade_id: Some("2".to_string()),
    };
    assert!(router.accept(streamed, Origin::Stream).await);

    let report = poller.poll_once().await.unwrap();
    assert_eq!(report.accepted, 1);
    assert_eq!(drain(&mut rx), vec![Some("2".to_string()), Some("3".to_string())]);

    let counts = router.counts();
    assert_eq!((counts.from_stream, counts.from_poll), (1, 1));
}

#[tokio::test]
async fn test_failed_poll_leaves_router_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/trades"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;
    let (poller, router, mut rx) = poller(&server);

    assert!(poller.poll_once().await.is_err());
    assert_eq!(router.watermark().get(), Ts::ZERO);
    assert!(drain(&mut rx).is_empty());
}

//! Decision pipeline driven by a mocked Gemini endpoint

use engine::{Advisor, DecisionPipeline, GeminiAdvisor, GeminiConfig, PipelineConfig};
use feeds::testing::{StubGateway, test_symbol, trade};
use pretty_assertions::assert_eq;
use rstest::rstest;
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn gemini_replying(text: &str) -> (MockServer, Arc<dyn Advisor>) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": text}]}}]
        })))
        .mount(&server)
        .await;

    let mut config = GeminiConfig::new("test-key", "gemini-1.5-flash");
    config.base_url = server.uri();
    let advisor: Arc<dyn Advisor> = Arc::new(GeminiAdvisor::new(config).unwrap());
    (server, advisor)
}

fn pipeline_config(dry_run: bool) -> PipelineConfig {
    let mut config = PipelineConfig::new(
        test_symbol(),
        Decimal::from(10),
        Decimal::from_str("0.000001").unwrap(),
        dry_run,
    );
    config.advisory_every = 3;
    config
}

#[rstest]
#[case(r#"{"action": "long", "confidence": 0.9, "reason": "higher highs"}"#, "BUY")]
#[case(r#"Analysis done. {"action": "short", "confidence": 0.7}"#, "SELL")]
#[tokio::test]
async fn test_advice_on_third_trade_places_order(#[case] reply: &str, #[case] side: &str) {
    let (_server, advisor) = gemini_replying(reply).await;
    let gateway = Arc::new(StubGateway::new());
    let mut pipeline = DecisionPipeline::new(pipeline_config(false), Some(advisor), gateway.clone());

    for (ts, price) in [(1, 100), (2, 101), (3, 102)] {
        pipeline.on_trade(trade(ts, price)).await;
    }

    let placed = gateway.placed_orders();
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].side.as_str(), side);
    assert_eq!(placed[0].quantity, Decimal::from_str("0.098039").unwrap());
    assert_eq!(pipeline.summary().submitted, 1);
}

#[rstest]
#[case(r#"{"action": "flat", "confidence": 0.2}"#)]
#[case("I am not able to give trading advice.")]
#[case(r#"{"action": "moon"}"#)]
#[tokio::test]
async fn test_flat_or_unusable_advice_places_nothing(#[case] reply: &str) {
    let (_server, advisor) = gemini_replying(reply).await;
    let gateway = Arc::new(StubGateway::new());
    let mut pipeline = DecisionPipeline::new(pipeline_config(false), Some(advisor), gateway.clone());

    for ts in 1..=6 {
        pipeline.on_trade(trade(ts, 100)).await;
    }

    assert_eq!(pipeline.summary().cycles, 2);
    assert_eq!(gateway.place_calls(), 0);
}

#[tokio::test]
async fn test_dry_run_consults_but_never_submits() {
    let (server, advisor) = gemini_replying(r#"{"action": "long", "confidence": 1}"#).await;
    let gateway = Arc::new(StubGateway::new());
    let mut pipeline = DecisionPipeline::new(pipeline_config(true), Some(advisor), gateway.clone());

    for ts in 1..=3 {
        pipeline.on_trade(trade(ts, 100)).await;
    }

    assert_eq!(server.received_requests().await.map(|r| r.len()), Some(1));
    assert_eq!(pipeline.summary().dry_runs, 1);
    assert_eq!(gateway.place_calls(), 0);
}

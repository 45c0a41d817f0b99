//! Gemini-backed advisor

use crate::advisory::{Advisor, AdvisoryError, MarketState, Recommendation};
use common::Trade;
use common::constants::buffers::ADVISORY_TRADE_SAMPLE;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// First `{` to last `}` of the model output
const JSON_OBJECT: &str = r"\{[\s\S]*\}";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub request_timeout: Duration,
}

impl GeminiConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// Asks a Gemini model for a long/short/flat call on recent trades
pub struct GeminiAdvisor {
    config: GeminiConfig,
    client: Client,
    json_object: Regex,
}

impl GeminiAdvisor {
    pub fn new(config: GeminiConfig) -> Result<Self, AdvisoryError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        let json_object =
            Regex::new(JSON_OBJECT).map_err(|e| AdvisoryError::Malformed(e.to_string()))?;
        Ok(Self {
            config,
            client,
            json_object,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn prompt(trades: &[Trade], market: &MarketState) -> String {
        let start = trades.len().saturating_sub(ADVISORY_TRADE_SAMPLE);
        let sample: Vec<_> = trades[start..]
            .iter()
            .map(|t| {
                json!({
                    "ts": t.ts.as_millis(),
                    "price": t.price.to_string(),
                    "quantity": t.quantity.to_string(),
                    "side": t.side.map(|s| s.as_str()),
                })
            })
            .collect();
        format!(
            "You are a trading assistant. Analyze symbol {} (last price {}) with recent trades \
             and recommend long/short/flat. Respond in JSON with keys: action [long|short|flat], \
             confidence [0-1], reason, stop_loss, take_profit.\nRecentTrades: {}\n",
            market.symbol,
            market.last_price,
            serde_json::Value::Array(sample)
        )
    }

    /// Pull a recommendation out of free-form model text
    fn extract(&self, text: &str) -> Result<Recommendation, AdvisoryError> {
        let object = self
            .json_object
            .find(text)
            .ok_or_else(|| AdvisoryError::Malformed("no JSON object in output".to_string()))?;
        let mut rec: Recommendation = serde_json::from_str(object.as_str())
            .map_err(|e| AdvisoryError::Malformed(e.to_string()))?;
        rec.confidence = rec.confidence.clamp(0.0, 1.0);
        Ok(rec)
    }
}

#[async_trait::async_trait]
impl Advisor for GeminiAdvisor {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn analyze(
        &self,
        trades: &[Trade],
        market: &MarketState,
    ) -> Result<Recommendation, AdvisoryError> {
        let body = json!({
            "contents": [{"parts": [{"text": Self::prompt(trades, market)}]}]
        });
        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdvisoryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        let text: String = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("\n");
        if text.trim().is_empty() {
            return Err(AdvisoryError::Malformed("no text in response".to_string()));
        }
        debug!("Gemini output: {}", text);
        self.extract(&text)
    }
}

//! Wallex REST gateway
//!
//! Responses are wrapped in `{"success": bool, "message": str, "result": ...}`;
//! a `success: false` envelope is reported as [`GatewayError::Rejected`].

use crate::common::gateway::{
    DepthSnapshot, ExchangeGateway, GatewayError, MarketInfo, OpenOrder, PriceLevel,
};
use crate::common::parser::{parse_decimal, parse_trades};
use crate::wallex::config::WallexConfig;
use common::{OrderId, OrderRequest, Side, Symbol, Trade, Ts};
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

const API_KEY_HEADER: &str = "X-API-Key";

/// Order submission body
#[derive(Debug, Serialize)]
struct PlaceOrderBody<'a> {
    symbol: &'a str,
    side: &'a str,
    #[serde(rename = "type")]
    order_type: &'a str,
    quantity: String,
}

/// `ExchangeGateway` over the Wallex HTTPS API
pub struct WallexRestClient {
    config: WallexConfig,
    client: Client,
}

impl WallexRestClient {
    /// Build a client with the configured request timeout
    pub fn new(config: WallexConfig) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { config, client })
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn request(&self, method: Method, path: &str, private: bool) -> Result<RequestBuilder, GatewayError> {
        if private && !self.config.has_credentials() {
            return Err(GatewayError::MissingCredentials {
                endpoint: path.to_string(),
            });
        }
        let url = format!("{}{}", self.config.base_url, path);
        let mut builder = self.client.request(method, url);
        if self.config.has_credentials() {
            builder = builder.header(API_KEY_HEADER, self.config.api_key.as_str());
        }
        Ok(builder)
    }

    async fn send(&self, endpoint: &str, builder: RequestBuilder) -> Result<Value, GatewayError> {
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }
        let body: Value = serde_json::from_str(&text).map_err(|e| GatewayError::Decode {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        if body.get("success").and_then(Value::as_bool) == Some(false) {
            let reason = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("request failed")
                .to_string();
            return Err(GatewayError::Rejected { reason });
        }
        Ok(body)
    }
}

#[async_trait::async_trait]
impl ExchangeGateway for WallexRestClient {
    async fn get_markets(&self) -> Result<Vec<MarketInfo>, GatewayError> {
        const PATH: &str = "/v1/markets";
        let body = self.send(PATH, self.request(Method::GET, PATH, false)?).await?;
        let markets = parse_markets(&body);
        debug!("Fetched {} markets", markets.len());
        Ok(markets)
    }

    async fn get_trades(
        &self,
        symbol: &Symbol,
        since: Option<Ts>,
    ) -> Result<Vec<Trade>, GatewayError> {
        const PATH: &str = "/v1/trades";
        let builder = self
            .request(Method::GET, PATH, false)?
            .query(&[("symbol", symbol.as_str())]);
        let body = self.send(PATH, builder).await?;

        let mut trades = parse_trades(symbol, &body);
        if let Some(since) = since {
            trades.retain(|t| t.ts > since);
        }
        trades.sort_by_key(|t| t.ts);
        Ok(trades)
    }

    async fn get_depth(&self, symbol: &Symbol) -> Result<DepthSnapshot, GatewayError> {
        const PATH: &str = "/v1/depth";
        let builder = self
            .request(Method::GET, PATH, false)?
            .query(&[("symbol", symbol.as_str())]);
        let body = self.send(PATH, builder).await?;
        Ok(parse_depth(&body))
    }

    async fn get_open_orders(
        &self,
        symbol: Option<&Symbol>,
    ) -> Result<Vec<OpenOrder>, GatewayError> {
        const PATH: &str = "/v1/account/openOrders";
        let mut builder = self.request(Method::GET, PATH, true)?;
        if let Some(symbol) = symbol {
            builder = builder.query(&[("symbol", symbol.as_str())]);
        }
        let body = self.send(PATH, builder).await?;
        Ok(parse_open_orders(&body))
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderId, GatewayError> {
        const PATH: &str = "/v1/account/orders";
        let payload = PlaceOrderBody {
            symbol: request.symbol.as_str(),
            side: request.side.as_str(),
            order_type: request.order_type.as_str(),
            quantity: request.quantity.normalize().to_string(),
        };
        let builder = self.request(Method::POST, PATH, true)?.json(&payload);
        let body = self.send(PATH, builder).await?;

        let order_id = body
            .get("result")
            .and_then(order_id_of)
            .ok_or_else(|| GatewayError::Decode {
                endpoint: PATH.to_string(),
                reason: "order id missing from response".to_string(),
            })?;
        info!(
            "Order accepted: {} {} {} qty={} id={}",
            request.symbol, request.side, payload.order_type, payload.quantity, order_id
        );
        Ok(order_id)
    }

    async fn cancel_order(&self, order_id: &OrderId) -> Result<(), GatewayError> {
        let path = format!("/v1/account/orders/{}", order_id.0);
        let builder = self.request(Method::DELETE, &path, true)?;
        self.send(&path, builder).await?;
        Ok(())
    }
}

/// Market listing: `result.symbols` as a map or list, or a bare list
fn parse_markets(body: &Value) -> Vec<MarketInfo> {
    let result = body.get("result").unwrap_or(body);
    let listing = result.get("symbols").or_else(|| result.get("markets")).unwrap_or(result);

    let entries: Vec<(Option<&str>, &Value)> = match listing {
        Value::Object(map) => map.iter().map(|(k, v)| (Some(k.as_str()), v)).collect(),
        Value::Array(items) => items.iter().map(|v| (None, v)).collect(),
        _ => Vec::new(),
    };

    entries
        .into_iter()
        .filter_map(|(key, entry)| {
            let symbol = entry
                .get("symbol")
                .and_then(Value::as_str)
                .or(key)?
                .to_ascii_uppercase();
            Some(MarketInfo {
                symbol,
                base_asset: str_field(entry, &["baseAsset", "base_asset"]),
                quote_asset: str_field(entry, &["quoteAsset", "quote_asset"]),
                min_qty: ["minQty", "min_qty", "minQuantity"]
                    .iter()
                    .find_map(|k| entry.get(*k).and_then(parse_decimal)),
                tradable: entry
                    .get("isTradable")
                    .or_else(|| entry.get("tradable"))
                    .and_then(Value::as_bool)
                    .unwrap_or(true),
            })
        })
        .collect()
}

fn parse_depth(body: &Value) -> DepthSnapshot {
    let result = body.get("result").unwrap_or(body);
    let side = |keys: [&str; 2]| -> Vec<PriceLevel> {
        keys.iter()
            .find_map(|k| result.get(*k).and_then(Value::as_array))
            .map(|levels| levels.iter().filter_map(parse_level).collect())
            .unwrap_or_default()
    };
    let mut bids = side(["bid", "bids"]);
    let mut asks = side(["ask", "asks"]);
    bids.sort_by(|a, b| b.price.cmp(&a.price));
    asks.sort_by(|a, b| a.price.cmp(&b.price));
    DepthSnapshot { bids, asks }
}

fn parse_level(level: &Value) -> Option<PriceLevel> {
    let (price, quantity) = match level {
        Value::Array(pair) if pair.len() >= 2 => (&pair[0], &pair[1]),
        Value::Object(_) => (level.get("price")?, level.get("quantity")?),
        _ => return None,
    };
    Some(PriceLevel {
        price: parse_decimal(price)?,
        quantity: parse_decimal(quantity)?,
    })
}

fn parse_open_orders(body: &Value) -> Vec<OpenOrder> {
    let result = body.get("result").unwrap_or(body);
    let orders = result
        .get("orders")
        .and_then(Value::as_array)
        .or_else(|| result.as_array());
    orders
        .map(|items| {
            items
                .iter()
                .filter_map(|o| {
                    Some(OpenOrder {
                        order_id: order_id_of(o)?,
                        symbol: str_field(o, &["symbol"]).unwrap_or_default(),
                        side: str_field(o, &["side"]).and_then(|s| {
                            match s.to_ascii_uppercase().as_str() {
                                "BUY" => Some(Side::Buy),
                                "SELL" => Some(Side::Sell),
                                _ => None,
                            }
                        }),
                        quantity: ["origQty", "quantity"]
                            .iter()
                            .find_map(|k| o.get(*k).and_then(parse_decimal)),
                        price: o.get("price").and_then(parse_decimal),
                        status: str_field(o, &["status"]),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn order_id_of(value: &Value) -> Option<OrderId> {
    ["clientOrderId", "orderId", "id"].iter().find_map(|k| {
        match value.get(*k)? {
            Value::String(s) if !s.is_empty() => Some(OrderId(s.clone())),
            Value::Number(n) => Some(OrderId(n.to_string())),
            _ => None,
        }
    })
}

fn str_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

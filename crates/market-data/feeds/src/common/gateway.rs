//! Exchange gateway capability
//!
//! Request/response access to one exchange: market metadata, recent trades,
//! depth, open orders and order placement. Every call can fail; callers decide
//! whether a failure is fatal.

use common::{OrderId, OrderRequest, Side, Symbol, Trade, Ts};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Gateway errors
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network / TLS / timeout failure
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Exchange answered with a non-success HTTP status
    #[error("HTTP {status} from {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// Exchange answered with a body we could not interpret
    #[error("Unexpected response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    /// Exchange accepted the request but reported failure
    #[error("Request rejected by exchange: {reason}")]
    Rejected { reason: String },

    /// Private endpoint called without an API key
    #[error("Missing API key for {endpoint}")]
    MissingCredentials { endpoint: String },
}

/// Listing entry from the market metadata endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketInfo {
    pub symbol: String,
    pub base_asset: Option<String>,
    pub quote_asset: Option<String>,
    /// Minimum order quantity when the listing reports one
    pub min_qty: Option<Decimal>,
    pub tradable: bool,
}

/// One side-level of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Order book snapshot as served by the exchange
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthSnapshot {
    /// Highest price first
    pub bids: Vec<PriceLevel>,
    /// Lowest price first
    pub asks: Vec<PriceLevel>,
}

impl DepthSnapshot {
    #[must_use]
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }
}

/// Open order on the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: OrderId,
    pub symbol: String,
    pub side: Option<Side>,
    pub quantity: Option<Decimal>,
    pub price: Option<Decimal>,
    pub status: Option<String>,
}

/// Request/response access to one exchange
#[async_trait::async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// All listed markets
    async fn get_markets(&self) -> Result<Vec<MarketInfo>, GatewayError>;

    /// Recent trades for `symbol`, ascending by timestamp.
    ///
    /// With `since`, only trades strictly newer than it are returned.
    async fn get_trades(&self, symbol: &Symbol, since: Option<Ts>)
    -> Result<Vec<Trade>, GatewayError>;

    /// Order book snapshot
    async fn get_depth(&self, symbol: &Symbol) -> Result<DepthSnapshot, GatewayError>;

    /// Open orders, optionally narrowed to one symbol
    async fn get_open_orders(&self, symbol: Option<&Symbol>)
    -> Result<Vec<OpenOrder>, GatewayError>;

    /// Submit an order
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderId, GatewayError>;

    /// Cancel an order
    async fn cancel_order(&self, order_id: &OrderId) -> Result<(), GatewayError>;
}

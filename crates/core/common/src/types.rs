//! Core types shared by the feed, router and decision layers

use crate::constants::time::NANOS_PER_MILLI;
use crate::errors::CommonError;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange symbol for the single traded market (e.g. `BTCUSDT`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Maximum accepted symbol length
    pub const MAX_LEN: usize = 20;

    /// Parse and normalize a symbol.
    ///
    /// Symbols are upper-cased; only ASCII alphanumerics are accepted.
    pub fn parse(raw: &str) -> Result<Self, CommonError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.len() > Self::MAX_LEN {
            return Err(CommonError::InvalidSymbol {
                symbol: raw.to_string(),
            });
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CommonError::InvalidSymbol {
                symbol: raw.to_string(),
            });
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Symbol as exchange string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the trade channel for this symbol on the socket feed
    #[must_use]
    pub fn trade_channel(&self) -> String {
        format!("{}@trade", self.0)
    }
}

impl TryFrom<String> for Symbol {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order / aggressor side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy
    Buy,
    /// Sell
    Sell,
}

impl Side {
    /// Wire representation used by the exchange
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamp in nanoseconds since UNIX epoch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ts(pub u64);

impl Ts {
    /// Epoch
    pub const ZERO: Self = Self(0);

    /// Wall-clock now; clocks before the epoch read as zero
    #[must_use]
    pub fn now() -> Self {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        Self(u64::try_from(nanos).unwrap_or_default())
    }

    /// Create timestamp from nanoseconds
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Create timestamp from milliseconds
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(NANOS_PER_MILLI))
    }

    /// Get timestamp as nanoseconds
    #[must_use]
    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Get timestamp as milliseconds
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0 / NANOS_PER_MILLI
    }
}

impl fmt::Display for Ts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.as_millis())
    }
}

/// Which ingestion channel delivered a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Persistent socket subscription
    Stream,
    /// REST polling fallback
    Poll,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream => f.write_str("stream"),
            Self::Poll => f.write_str("poll"),
        }
    }
}

/// A single executed trade on the exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: Symbol,
    pub price: Decimal,
    pub quantity: Decimal,
    /// Aggressor side, when the venue reports it
    pub side: Option<Side>,
    /// Exchange-provided trade time; the ordering and dedup key
    pub ts: Ts,
    /// Exchange trade id or sequence, when the venue reports one
    pub trade_id: Option<String>,
}

impl Trade {
    /// Validated trade with no side or id.
    ///
    /// Price must be positive and quantity non-negative.
    pub fn new(
        symbol: Symbol,
        price: Decimal,
        quantity: Decimal,
        ts: Ts,
    ) -> Result<Self, CommonError> {
        if price <= Decimal::ZERO {
            return Err(CommonError::InvalidPrice {
                value: price.to_string(),
            });
        }
        if quantity < Decimal::ZERO {
            return Err(CommonError::InvalidQuantity {
                value: quantity.to_string(),
            });
        }
        Ok(Self {
            symbol,
            price,
            quantity,
            side: None,
            ts,
            trade_id: None,
        })
    }

    /// Dedup identity of this trade
    #[must_use]
    pub fn key(&self) -> (Ts, Option<&str>) {
        (self.ts, self.trade_id.as_deref())
    }
}

/// Exchange order identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order type accepted by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
}

impl OrderType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Market => "MARKET",
        }
    }
}

/// Order submission request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
}

impl OrderRequest {
    /// Market order for the given quantity
    #[must_use]
    pub fn market(symbol: Symbol, side: Side, quantity: Decimal) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::Market,
            quantity,
        }
    }
}

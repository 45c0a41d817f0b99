//! Tolerant trade payload parsing
//!
//! The socket feed and the REST trades endpoint do not agree on field names
//! or number encodings, so trades are read from loose JSON rather than a
//! fixed serde struct.

use common::constants::time::MILLIS_PER_SEC;
use common::{Side, Symbol, Trade, Ts};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::debug;

const TS_KEYS: [&str; 5] = ["ts", "T", "t", "timestamp", "time"];
const PRICE_KEYS: [&str; 2] = ["price", "p"];
const QTY_KEYS: [&str; 3] = ["quantity", "q", "amount"];
const ID_KEYS: [&str; 4] = ["id", "tradeId", "trade_id", "a"];
const SYMBOL_KEYS: [&str; 2] = ["symbol", "s"];
const LIST_KEYS: [&str; 5] = ["trades", "data", "result", "items", "latestTrades"];

/// Epoch values below this are seconds rather than milliseconds
const SECONDS_CUTOFF: u64 = 100_000_000_000;

/// Find the list of trade objects in a REST response.
///
/// Accepts a bare array, or an object carrying the array under one of the
/// usual envelope keys (one level of nesting is followed, e.g.
/// `{"result": {"latestTrades": [...]}}`).
#[must_use]
pub fn extract_trade_list(body: &Value) -> Vec<&Value> {
    match body {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => {
            for key in LIST_KEYS {
                match map.get(key) {
                    Some(Value::Array(items)) => return items.iter().collect(),
                    Some(nested @ Value::Object(_)) => {
                        let inner = extract_trade_list(nested);
                        if !inner.is_empty() {
                            return inner;
                        }
                    }
                    _ => {}
                }
            }
            map.values()
                .find_map(|v| v.as_array())
                .map(|items| items.iter().collect())
                .unwrap_or_default()
        }
        _ => Vec::new(),
    }
}

/// Parse one trade object.
///
/// Returns `None` when the payload is not an object, names another symbol,
/// lacks a usable timestamp, or fails [`Trade::new`] validation.
#[must_use]
pub fn parse_trade(symbol: &Symbol, raw: &Value) -> Option<Trade> {
    let obj = raw.as_object()?;

    if let Some(other) = first_str(obj, &SYMBOL_KEYS) {
        if !other.eq_ignore_ascii_case(symbol.as_str()) {
            return None;
        }
    }

    let ts = first_of(obj, &TS_KEYS).and_then(parse_ts)?;
    let price = first_of(obj, &PRICE_KEYS).and_then(parse_decimal)?;
    let quantity = first_of(obj, &QTY_KEYS)
        .and_then(parse_decimal)
        .unwrap_or(Decimal::ZERO);

    let mut trade = Trade::new(symbol.clone(), price, quantity, ts).ok()?;
    trade.side = parse_side(obj);
    trade.trade_id = first_of(obj, &ID_KEYS).and_then(id_string);
    Some(trade)
}

/// Parse every trade in a REST response, skipping unreadable entries
#[must_use]
pub fn parse_trades(symbol: &Symbol, body: &Value) -> Vec<Trade> {
    extract_trade_list(body)
        .into_iter()
        .filter_map(|raw| {
            let trade = parse_trade(symbol, raw);
            if trade.is_none() {
                debug!("Skipping unparseable trade entry {}", raw);
            }
            trade
        })
        .collect()
}

/// Decimal from a JSON string or number
#[must_use]
pub fn parse_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => decimal_from_str(s.trim()),
        Value::Number(n) => decimal_from_str(&n.to_string()),
        _ => None,
    }
}

fn decimal_from_str(s: &str) -> Option<Decimal> {
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

/// Trade time from epoch seconds/millis (number or numeric string) or RFC 3339
#[must_use]
pub fn parse_ts(value: &Value) -> Option<Ts> {
    let millis = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))?,
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<u64>() {
                Ok(n) => n,
                Err(_) => {
                    let parsed = chrono::DateTime::parse_from_rfc3339(s).ok()?;
                    let nanos = parsed.timestamp_nanos_opt()?;
                    return u64::try_from(nanos).ok().map(Ts::from_nanos);
                }
            }
        }
        _ => return None,
    };
    if millis == 0 {
        return None;
    }
    if millis < SECONDS_CUTOFF {
        return Some(Ts::from_millis(millis.saturating_mul(MILLIS_PER_SEC)));
    }
    Some(Ts::from_millis(millis))
}

fn parse_side(obj: &Map<String, Value>) -> Option<Side> {
    if let Some(side) = first_str(obj, &["side", "S"]) {
        return match side.to_ascii_lowercase().as_str() {
            "buy" | "bid" => Some(Side::Buy),
            "sell" | "ask" => Some(Side::Sell),
            _ => None,
        };
    }
    if let Some(is_buy) = obj.get("isBuyOrder").and_then(Value::as_bool) {
        return Some(if is_buy { Side::Buy } else { Side::Sell });
    }
    // Buyer is maker => aggressor sold
    obj.get("m")
        .and_then(Value::as_bool)
        .map(|maker| if maker { Side::Sell } else { Side::Buy })
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_of<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn first_str<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| obj.get(*k).and_then(Value::as_str))
}

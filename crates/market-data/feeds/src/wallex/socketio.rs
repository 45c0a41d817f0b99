//! Minimal Engine.IO v4 / Socket.IO v5 text framing
//!
//! Only what a trade subscription needs: handshake, heartbeat, namespace
//! connect and JSON events on the default namespace. Binary attachments are
//! not supported.

use serde_json::Value;

/// Engine.IO packet carried in one websocket text frame
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    /// `0{json}` handshake with session parameters
    Open(Value),
    /// `1`
    Close,
    /// `2[payload]` server heartbeat
    Ping(String),
    /// `3[payload]`
    Pong(String),
    /// `4...` Socket.IO payload
    Message(SocketPacket),
    /// `5`
    Upgrade,
    /// `6`
    Noop,
}

/// Socket.IO packet inside an Engine.IO message
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, args: Vec<Value> },
    ConnectError(Option<Value>),
    /// Acks and binary packets; ignored by the stream
    Other(char),
}

/// Frame decoding failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("unknown packet type {0:?}")]
    UnknownType(char),
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Decode one Engine.IO text frame
pub fn decode(frame: &str) -> Result<EnginePacket, FrameError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(FrameError::Empty)?;
    let rest = chars.as_str();
    match kind {
        '0' => serde_json::from_str(rest)
            .map(EnginePacket::Open)
            .map_err(|e| FrameError::Malformed(e.to_string())),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping(rest.to_string())),
        '3' => Ok(EnginePacket::Pong(rest.to_string())),
        '4' => decode_socket(rest).map(EnginePacket::Message),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(FrameError::UnknownType(other)),
    }
}

fn decode_socket(body: &str) -> Result<SocketPacket, FrameError> {
    let mut chars = body.chars();
    let kind = chars.next().ok_or(FrameError::Empty)?;
    let mut rest = chars.as_str();

    // Optional namespace: "/name,"
    if rest.starts_with('/') {
        rest = rest.split_once(',').map_or("", |(_, tail)| tail);
    }
    // Optional ack id before the JSON payload
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());

    let payload = || -> Result<Option<Value>, FrameError> {
        if rest.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(rest)
            .map(Some)
            .map_err(|e| FrameError::Malformed(e.to_string()))
    };

    match kind {
        '0' => Ok(SocketPacket::Connect(payload()?)),
        '1' => Ok(SocketPacket::Disconnect),
        '2' => {
            let Some(Value::Array(mut items)) = payload()? else {
                return Err(FrameError::Malformed("event payload is not an array".to_string()));
            };
            if items.is_empty() {
                return Err(FrameError::Malformed("event without name".to_string()));
            }
            let name = match items.remove(0) {
                Value::String(name) => name,
                other => return Err(FrameError::Malformed(format!("event name {other}"))),
            };
            Ok(SocketPacket::Event { name, args: items })
        }
        '4' => Ok(SocketPacket::ConnectError(payload()?)),
        '3' | '5' | '6' => Ok(SocketPacket::Other(kind)),
        other => Err(FrameError::UnknownType(other)),
    }
}

/// Heartbeat reply echoing the ping payload
#[must_use]
pub fn encode_pong(payload: &str) -> String {
    format!("3{payload}")
}

/// Connect to the default namespace
#[must_use]
pub fn encode_connect() -> String {
    "40".to_string()
}

/// Emit an event on the default namespace
#[must_use]
pub fn encode_event(name: &str, args: &[Value]) -> String {
    let mut items = Vec::with_capacity(args.len() + 1);
    items.push(Value::String(name.to_string()));
    items.extend(args.iter().cloned());
    format!("42{}", Value::Array(items))
}

/// Split a `Broadcaster` event into `(channel, data)`.
///
/// The exchange emits either two arguments `(channel, data)` or one object
/// carrying `channel`/`topic` and optionally `data`.
#[must_use]
pub fn broadcaster_payload(args: &[Value]) -> Option<(String, Value)> {
    match args {
        [Value::String(channel), data, ..] => Some((channel.clone(), data.clone())),
        [Value::Object(map)] => {
            let channel = map
                .get("channel")
                .or_else(|| map.get("topic"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let data = map
                .get("data")
                .cloned()
                .unwrap_or_else(|| Value::Object(map.clone()));
            Some((channel, data))
        }
        _ => None,
    }
}

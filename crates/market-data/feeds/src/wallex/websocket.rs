//! Wallex Socket.IO trade stream

use crate::common::adapter::TradeSource;
use crate::common::parser::parse_trade;
use crate::wallex::config::WallexConfig;
use crate::wallex::socketio::{
    self, EnginePacket, SocketPacket, broadcaster_payload, encode_connect, encode_event,
    encode_pong,
};
use anyhow::{Context, bail};
use common::{Symbol, Trade};
use futures_util::{SinkExt, StreamExt};
use rustc_hash::FxHashSet;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const BROADCAST_EVENT: &str = "Broadcaster";
const SUBSCRIBE_EVENT: &str = "subscribe";
const TRADE_SUFFIX: &str = "@trade";

/// Engine.IO defaults when the handshake omits them
const DEFAULT_PING_INTERVAL_MS: u64 = 25_000;
const DEFAULT_PING_TIMEOUT_MS: u64 = 20_000;

/// Trade subscription over the exchange's Socket.IO endpoint
pub struct WallexTradeStream {
    config: WallexConfig,
    socket: Option<Socket>,
    /// Channels requested by the caller; replayed on every connect
    channels: FxHashSet<String>,
    /// Channels already emitted on the current session
    session_channels: FxHashSet<String>,
    heartbeat: Duration,
}

impl WallexTradeStream {
    #[must_use]
    pub fn new(config: WallexConfig) -> Self {
        Self {
            config,
            socket: None,
            channels: FxHashSet::default(),
            session_channels: FxHashSet::default(),
            heartbeat: Duration::from_millis(DEFAULT_PING_INTERVAL_MS + DEFAULT_PING_TIMEOUT_MS),
        }
    }

    /// Whether a socket session is open
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    async fn handshake(&mut self, socket: &mut Socket) -> anyhow::Result<()> {
        loop {
            let frame = next_text(socket)
                .await?
                .context("socket closed during handshake")?;
            match socketio::decode(&frame) {
                Ok(EnginePacket::Open(params)) => {
                    let interval = params["pingInterval"].as_u64().unwrap_or(DEFAULT_PING_INTERVAL_MS);
                    let grace = params["pingTimeout"].as_u64().unwrap_or(DEFAULT_PING_TIMEOUT_MS);
                    self.heartbeat = Duration::from_millis(interval + grace);
                    socket.send(Message::Text(encode_connect())).await?;
                }
                Ok(EnginePacket::Ping(payload)) => {
                    socket.send(Message::Text(encode_pong(&payload))).await?;
                }
                Ok(EnginePacket::Message(SocketPacket::Connect(_))) => return Ok(()),
                Ok(EnginePacket::Message(SocketPacket::ConnectError(reason))) => {
                    bail!("namespace connect refused: {reason:?}");
                }
                Ok(EnginePacket::Close) => bail!("server closed during handshake"),
                Ok(other) => debug!("Ignoring handshake packet {:?}", other),
                Err(e) => warn!("Bad handshake frame {:?}: {}", frame, e),
            }
        }
    }

    async fn emit_subscribe(socket: &mut Socket, channel: &str) -> anyhow::Result<()> {
        let frame = encode_event(SUBSCRIBE_EVENT, &[json!({ "channel": channel })]);
        socket.send(Message::Text(frame)).await?;
        info!("Subscribed to {}", channel);
        Ok(())
    }
}

#[async_trait::async_trait]
impl TradeSource for WallexTradeStream {
    fn name(&self) -> &str {
        "wallex-socket"
    }

    async fn connect(&mut self) -> anyhow::Result<()> {
        let url = self.config.socket_url().context("invalid socket URL")?;
        info!("Connecting to {}", url);

        let (mut socket, _) = timeout(self.config.handshake_timeout, connect_async(url.as_str()))
            .await
            .context("socket connect timed out")??;
        timeout(self.config.handshake_timeout, self.handshake(&mut socket))
            .await
            .context("socket handshake timed out")??;

        self.session_channels.clear();
        let channels: Vec<String> = self.channels.iter().cloned().collect();
        for channel in channels {
            Self::emit_subscribe(&mut socket, &channel).await?;
            self.session_channels.insert(channel);
        }

        self.socket = Some(socket);
        info!("Connected to Wallex socket");
        Ok(())
    }

    async fn subscribe(&mut self, symbol: &Symbol) -> anyhow::Result<()> {
        let channel = symbol.trade_channel();
        self.channels.insert(channel.clone());

        if self.session_channels.contains(&channel) {
            debug!("Already subscribed to {}", channel);
            return Ok(());
        }
        if let Some(socket) = self.socket.as_mut() {
            Self::emit_subscribe(socket, &channel).await?;
            self.session_channels.insert(channel);
        }
        Ok(())
    }

    async fn run(&mut self, tx: mpsc::Sender<Trade>) -> anyhow::Result<()> {
        let heartbeat = self.heartbeat;
        let socket = self.socket.as_mut().context("run called before connect")?;

        loop {
            let Ok(next) = timeout(heartbeat, socket.next()).await else {
                bail!("no heartbeat for {:?}", heartbeat);
            };
            let text = match next {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Ping(data))) => {
                    socket.send(Message::Pong(data)).await?;
                    continue;
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Socket closed by server: {:?}", frame);
                    return Ok(());
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e).context("socket read failed"),
                None => return Ok(()),
            };

            match socketio::decode(&text) {
                Ok(EnginePacket::Ping(payload)) => {
                    socket.send(Message::Text(encode_pong(&payload))).await?;
                }
                Ok(EnginePacket::Close | EnginePacket::Message(SocketPacket::Disconnect)) => {
                    info!("Server ended the socket session");
                    return Ok(());
                }
                Ok(EnginePacket::Message(SocketPacket::Event { name, args }))
                    if name == BROADCAST_EVENT =>
                {
                    for trade in trades_from_broadcast(&args) {
                        if tx.send(trade).await.is_err() {
                            debug!("Trade receiver dropped");
                            return Ok(());
                        }
                    }
                }
                Ok(other) => debug!("Ignoring packet {:?}", other),
                Err(e) => debug!("Unreadable frame: {}", e),
            }
        }
    }

    async fn disconnect(&mut self) -> anyhow::Result<()> {
        self.session_channels.clear();
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.send(Message::Text("41".to_string())).await {
                debug!("Namespace disconnect not sent: {}", e);
            }
            if let Err(e) = socket.close(None).await {
                debug!("Socket close failed: {}", e);
            }
            info!("Disconnected from Wallex socket");
        }
        Ok(())
    }
}

async fn next_text(socket: &mut Socket) -> anyhow::Result<Option<String>> {
    while let Some(msg) = socket.next().await {
        match msg? {
            Message::Text(text) => return Ok(Some(text)),
            Message::Ping(data) => socket.send(Message::Pong(data)).await?,
            Message::Close(_) => return Ok(None),
            _ => {}
        }
    }
    Ok(None)
}

/// Trades carried by one `Broadcaster` event on a `<SYMBOL>@trade` channel
fn trades_from_broadcast(args: &[Value]) -> Vec<Trade> {
    let Some((channel, data)) = broadcaster_payload(args) else {
        return Vec::new();
    };
    let Some(raw_symbol) = channel.strip_suffix(TRADE_SUFFIX) else {
        return Vec::new();
    };
    let Ok(symbol) = Symbol::parse(raw_symbol) else {
        debug!("Trade on unknown channel {}", channel);
        return Vec::new();
    };

    let items: Vec<&Value> = match &data {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    items
        .into_iter()
        .filter_map(|raw| {
            let trade = parse_trade(&symbol, raw);
            if trade.is_none() {
                debug!("Skipping unparseable trade payload {}", raw);
            }
            trade
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Ts;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_trades_from_pair_form() {
        let args = vec![
            json!("BTCUSDT@trade"),
            json!({"T": 1_700_000_000_000_u64, "p": "100", "q": "1", "id": "a1"}),
        ];
        let trades = trades_from_broadcast(&args);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].symbol.as_str(), "BTCUSDT");
        assert_eq!(trades[0].ts, Ts::from_millis(1_700_000_000_000));
    }

    #[test]
    fn test_trades_from_object_form_with_batch() {
        let args = vec![json!({
            "channel": "BTCUSDT@trade",
            "data": [
                {"ts": 1_700_000_000_000_u64, "price": "100"},
                {"ts": 1_700_000_000_001_u64, "price": "0"},
                {"ts": 1_700_000_000_002_u64, "price": "101"}
            ]
        })];
        let trades = trades_from_broadcast(&args);
        assert_eq!(trades.len(), 2);
    }

    #[test]
    fn test_non_trade_channels_ignored() {
        let depth = vec![json!("BTCUSDT@buyDepth"), json!({"p": "1"})];
        assert!(trades_from_broadcast(&depth).is_empty());

        let no_channel = vec![json!({"ts": 1_700_000_000_000_u64, "price": "100"})];
        assert!(trades_from_broadcast(&no_channel).is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_before_connect_is_recorded() {
        let mut stream = WallexTradeStream::new(WallexConfig::default());
        let symbol = Symbol::parse("BTCUSDT").unwrap();
        stream.subscribe(&symbol).await.unwrap();
        stream.subscribe(&symbol).await.unwrap();
        assert_eq!(stream.channels.len(), 1);
        assert!(!stream.is_connected());
    }

    #[tokio::test]
    async fn test_run_requires_connect() {
        let mut stream = WallexTradeStream::new(WallexConfig::default());
        let (tx, _rx) = mpsc::channel(1);
        assert!(stream.run(tx).await.is_err());
    }
}

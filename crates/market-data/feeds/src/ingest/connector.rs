//! Stream connector
//!
//! Owns a [`TradeSource`], keeps its subscription alive across transport
//! failures and forwards every streamed trade to the router. Connection state
//! and last-event time are published through [`ConnectorStatus`] for the
//! failover monitor.

use crate::common::adapter::TradeSource;
use crate::ingest::router::TradeRouter;
use common::constants::buffers::STREAM_CHANNEL_SIZE;
use common::constants::network::{MAX_RECONNECT_DELAY_MS, MIN_RECONNECT_DELAY_MS};
use common::{Origin, Shutdown, Symbol};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};

/// Stream connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    /// Connected, but no trade within the idle timeout
    Idle = 3,
}

impl ConnectionState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Idle,
            _ => Self::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Idle => "idle",
        };
        f.write_str(name)
    }
}

/// Read side of the stream's health, consumed by the failover monitor
pub trait Liveness: Send + Sync {
    /// Connected and not idle
    fn is_live(&self) -> bool;
    /// When the last streamed trade arrived (or when tracking started)
    fn last_event_at(&self) -> Instant;
}

/// Connection state shared between the connector and its observers
#[derive(Debug)]
pub struct ConnectorStatus {
    state: AtomicU8,
    last_event: Mutex<Instant>,
    reconnects: AtomicU64,
}

impl ConnectorStatus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            last_event: Mutex::new(Instant::now()),
            reconnects: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Number of sessions that ended and were retried
    #[must_use]
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    fn set_state(&self, state: ConnectionState) {
        let prev = self.state.swap(state as u8, Ordering::AcqRel);
        if prev != state as u8 {
            debug!(
                "Stream state {} -> {}",
                ConnectionState::from_u8(prev),
                state
            );
        }
    }

    fn record_event(&self) {
        *self.last_event.lock() = Instant::now();
    }
}

impl Default for ConnectorStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness for ConnectorStatus {
    fn is_live(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn last_event_at(&self) -> Instant {
        *self.last_event.lock()
    }
}

/// Stream connector settings
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub symbol: Symbol,
    /// No trade for this long marks the connection idle
    pub idle_timeout: Duration,
    /// First reconnect delay; never below one second
    pub initial_backoff: Duration,
    /// Reconnect delay cap
    pub max_backoff: Duration,
}

impl ConnectorConfig {
    #[must_use]
    pub fn new(symbol: Symbol, idle_timeout: Duration) -> Self {
        Self {
            symbol,
            idle_timeout,
            initial_backoff: Duration::from_millis(MIN_RECONNECT_DELAY_MS),
            max_backoff: Duration::from_millis(MAX_RECONNECT_DELAY_MS),
        }
    }
}

enum SessionEnd {
    Shutdown,
    Closed,
}

/// Keeps one trade subscription alive for the process lifetime
pub struct StreamConnector<S: TradeSource> {
    source: S,
    config: ConnectorConfig,
    router: Arc<TradeRouter>,
    status: Arc<ConnectorStatus>,
}

impl<S: TradeSource> StreamConnector<S> {
    #[must_use]
    pub fn new(source: S, config: ConnectorConfig, router: Arc<TradeRouter>) -> Self {
        Self {
            source,
            config,
            router,
            status: Arc::new(ConnectorStatus::new()),
        }
    }

    /// Shared status handle for the failover monitor
    #[must_use]
    pub fn status(&self) -> Arc<ConnectorStatus> {
        Arc::clone(&self.status)
    }

    /// Connect, stream and reconnect with backoff until shutdown.
    ///
    /// Transport failures are logged and retried; they never end the loop.
    pub async fn run(mut self, mut shutdown: Shutdown) {
        let floor = Duration::from_millis(MIN_RECONNECT_DELAY_MS);
        let initial = self.config.initial_backoff.max(floor);
        let cap = self.config.max_backoff.max(initial);
        let mut backoff = initial;

        info!(
            "Starting {} stream for {}",
            self.source.name(),
            self.config.symbol
        );

        while !shutdown.is_triggered() {
            self.status.set_state(ConnectionState::Connecting);
            let opened = tokio::select! {
                res = self.open_session() => Some(res),
                () = shutdown.wait() => None,
            };
            let Some(opened) = opened else { break };

            match opened {
                Ok(()) => {
                    backoff = initial;
                    self.status.set_state(ConnectionState::Connected);
                    info!("Stream connected for {}", self.config.symbol);
                    match self.stream(&mut shutdown).await {
                        Ok(SessionEnd::Shutdown) => break,
                        Ok(SessionEnd::Closed) => warn!("Stream session closed"),
                        Err(e) => warn!("Stream session failed: {:#}", e),
                    }
                }
                Err(e) => warn!("Stream connect failed: {:#}", e),
            }

            self.close_session().await;
            self.status.set_state(ConnectionState::Disconnected);
            self.status.reconnects.fetch_add(1, Ordering::Relaxed);
            info!("Reconnecting stream in {:?}", backoff);

            let slept = tokio::select! {
                () = sleep(backoff) => true,
                () = shutdown.wait() => false,
            };
            if !slept {
                break;
            }
            backoff = (backoff * 2).min(cap);
        }

        self.close_session().await;
        self.status.set_state(ConnectionState::Disconnected);
        info!("Stream connector stopped");
    }

    /// Connect and (re)subscribe; subscribing again on reconnect is safe
    async fn open_session(&mut self) -> anyhow::Result<()> {
        self.source.connect().await?;
        self.source.subscribe(&self.config.symbol).await?;
        Ok(())
    }

    async fn close_session(&mut self) {
        if let Err(e) = self.source.disconnect().await {
            debug!("Stream disconnect failed: {:#}", e);
        }
    }

    async fn stream(&mut self, shutdown: &mut Shutdown) -> anyhow::Result<SessionEnd> {
        let (tx, mut rx) = mpsc::channel(STREAM_CHANNEL_SIZE);
        let idle_timeout = self.config.idle_timeout;
        let router = Arc::clone(&self.router);
        let status = Arc::clone(&self.status);

        let mut session = self.source.run(tx);
        let mut finished: Option<anyhow::Result<()>> = None;

        loop {
            let idle_at = status.last_event_at() + idle_timeout;
            tokio::select! {
                res = &mut session, if finished.is_none() => {
                    finished = Some(res);
                }
                received = rx.recv() => {
                    let Some(trade) = received else {
                        // Source returned and every buffered trade is routed
                        return finished.unwrap_or(Ok(())).map(|()| SessionEnd::Closed);
                    };
                    status.record_event();
                    if status.state() == ConnectionState::Idle {
                        status.set_state(ConnectionState::Connected);
                        info!("Stream active again");
                    }
                    router.accept(trade, Origin::Stream).await;
                }
                () = sleep_until(idle_at), if status.state() == ConnectionState::Connected => {
                    status.set_state(ConnectionState::Idle);
                    warn!("No streamed trade for {:?}; stream marked idle", idle_timeout);
                }
                () = shutdown.wait() => return Ok(SessionEnd::Shutdown),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::watermark::Watermark;
    use crate::testing::{ScriptStep, ScriptedTradeSource, trade_with_id};
    use common::{Trade, Ts, shutdown_channel};
    use pretty_assertions::assert_eq;

    fn setup(
        source: ScriptedTradeSource,
    ) -> (StreamConnector<ScriptedTradeSource>, mpsc::Receiver<Trade>) {
        let symbol = Symbol::parse("BTCUSDT").unwrap();
        let (tx, rx) = mpsc::channel(64);
        let router = Arc::new(TradeRouter::new(symbol.clone(), Watermark::new(Ts::ZERO), tx));
        let config = ConnectorConfig::new(symbol, Duration::from_secs(15));
        (StreamConnector::new(source, config, router), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_streams_trades_to_router() {
        let (source, handle) = ScriptedTradeSource::new(vec![
            ScriptStep::Trade(trade_with_id(1, 100, "a")),
            ScriptStep::Trade(trade_with_id(2, 101, "b")),
        ]);
        let (connector, mut rx) = setup(source);
        let status = connector.status();
        let (trigger, shutdown) = shutdown_channel();
        let task = tokio::spawn(connector.run(shutdown));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.ts, Ts::from_millis(1));
        assert_eq!(second.ts, Ts::from_millis(2));
        assert_eq!(status.state(), ConnectionState::Connected);
        assert!(status.is_live());
        assert_eq!(handle.subscriptions(), vec!["BTCUSDT".to_string()]);

        trigger.trigger();
        task.await.unwrap();
        assert_eq!(status.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_and_resubscribes() {
        let (source, handle) = ScriptedTradeSource::new(vec![
            ScriptStep::Trade(trade_with_id(1, 100, "a")),
            ScriptStep::Disconnect,
            ScriptStep::Trade(trade_with_id(2, 100, "b")),
        ]);
        handle.fail_next_connects(2);
        let (connector, mut rx) = setup(source);
        let status = connector.status();
        let (trigger, shutdown) = shutdown_channel();
        let task = tokio::spawn(connector.run(shutdown));

        assert_eq!(rx.recv().await.unwrap().ts, Ts::from_millis(1));
        assert_eq!(rx.recv().await.unwrap().ts, Ts::from_millis(2));

        // two refused connects, one good session, one dropped session
        assert_eq!(handle.connects(), 4);
        assert_eq!(status.reconnects(), 3);
        assert_eq!(handle.subscriptions().len(), 2);

        trigger.trigger();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_marks_idle_and_recovers() {
        let (source, handle) = ScriptedTradeSource::new(vec![]);
        let (connector, mut rx) = setup(source);
        let status = connector.status();
        let (trigger, shutdown) = shutdown_channel();
        let task = tokio::spawn(connector.run(shutdown));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(status.state(), ConnectionState::Connected);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(status.state(), ConnectionState::Idle);
        assert!(!status.is_live());

        handle.push(ScriptStep::Trade(trade_with_id(5, 100, "x")));
        assert_eq!(rx.recv().await.unwrap().ts, Ts::from_millis(5));
        tokio::task::yield_now().await;
        assert_eq!(status.state(), ConnectionState::Connected);

        trigger.trigger();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_capped() {
        let (source, handle) = ScriptedTradeSource::new(vec![]);
        handle.fail_next_connects(u32::MAX);
        let (connector, _rx) = setup(source);
        let (trigger, shutdown) = shutdown_channel();
        let task = tokio::spawn(connector.run(shutdown));

        // 1 + 2 + 4 + 8 + 10 + 10 = 35s of delays before the 7th attempt
        tokio::time::sleep(Duration::from_millis(35_500)).await;
        assert_eq!(handle.connects(), 7);

        trigger.trigger();
        task.await.unwrap();
    }
}

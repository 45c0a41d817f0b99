//! Test doubles for the ingestion and decision layers
//!
//! Compiled for this crate's unit tests and, behind the `test-utils`
//! feature, for downstream crates' tests.

use crate::common::adapter::TradeSource;
use crate::common::gateway::{
    DepthSnapshot, ExchangeGateway, GatewayError, MarketInfo, OpenOrder,
};
use crate::ingest::connector::Liveness;
use common::{OrderId, OrderRequest, Symbol, Trade, Ts};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;

/// Symbol used by the builders
pub const TEST_SYMBOL: &str = "BTCUSDT";

/// `BTCUSDT` symbol
///
/// # Panics
/// Never; the literal is a valid symbol.
#[must_use]
pub fn test_symbol() -> Symbol {
    Symbol::parse(TEST_SYMBOL).unwrap()
}

/// Trade at `ts_ms` milliseconds with an integer price and unit quantity
#[must_use]
pub fn trade(ts_ms: u64, price: i64) -> Trade {
    Trade {
        symbol: test_symbol(),
        price: Decimal::from(price),
        quantity: Decimal::ONE,
        side: None,
        ts: Ts::from_millis(ts_ms),
        trade_id: None,
    }
}

/// Same as [`trade`] with an exchange trade id
#[must_use]
pub fn trade_with_id(ts_ms: u64, price: i64, id: &str) -> Trade {
    Trade {
        trade_id: Some(id.to_string()),
        ..trade(ts_ms, price)
    }
}

fn stub_failure(what: &str) -> GatewayError {
    GatewayError::Rejected {
        reason: format!("stub {what} failure"),
    }
}

/// In-memory [`ExchangeGateway`] recording every order call
#[derive(Default)]
pub struct StubGateway {
    trades: Mutex<Vec<Trade>>,
    markets: Mutex<Vec<MarketInfo>>,
    placed: Mutex<Vec<OrderRequest>>,
    trade_failures: AtomicU32,
    fail_markets: AtomicBool,
    fail_orders: AtomicBool,
    trade_calls: AtomicUsize,
    place_calls: AtomicUsize,
}

impl StubGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_trades(trades: Vec<Trade>) -> Self {
        let stub = Self::default();
        stub.set_trades(trades);
        stub
    }

    pub fn set_trades(&self, trades: Vec<Trade>) {
        *self.trades.lock() = trades;
    }

    pub fn set_markets(&self, markets: Vec<MarketInfo>) {
        *self.markets.lock() = markets;
    }

    /// Fail the next `n` trade fetches
    pub fn fail_next_trades(&self, n: u32) {
        self.trade_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_markets(&self, fail: bool) {
        self.fail_markets.store(fail, Ordering::SeqCst);
    }

    pub fn fail_orders(&self, fail: bool) {
        self.fail_orders.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn trade_calls(&self) -> usize {
        self.trade_calls.load(Ordering::SeqCst)
    }

    /// Every `place_order` call, including failed ones
    #[must_use]
    pub fn place_calls(&self) -> usize {
        self.place_calls.load(Ordering::SeqCst)
    }

    /// Orders the stub accepted
    #[must_use]
    pub fn placed_orders(&self) -> Vec<OrderRequest> {
        self.placed.lock().clone()
    }
}

#[async_trait::async_trait]
impl ExchangeGateway for StubGateway {
    async fn get_markets(&self) -> Result<Vec<MarketInfo>, GatewayError> {
        if self.fail_markets.load(Ordering::SeqCst) {
            return Err(stub_failure("markets"));
        }
        Ok(self.markets.lock().clone())
    }

    async fn get_trades(
        &self,
        symbol: &Symbol,
        since: Option<Ts>,
    ) -> Result<Vec<Trade>, GatewayError> {
        self.trade_calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.trade_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.trade_failures.store(pending - 1, Ordering::SeqCst);
            return Err(stub_failure("trades"));
        }
        let mut trades: Vec<Trade> = self
            .trades
            .lock()
            .iter()
            .filter(|t| &t.symbol == symbol && since.is_none_or(|s| t.ts > s))
            .cloned()
            .collect();
        trades.sort_by_key(|t| t.ts);
        Ok(trades)
    }

    async fn get_depth(&self, _symbol: &Symbol) -> Result<DepthSnapshot, GatewayError> {
        Ok(DepthSnapshot::default())
    }

    async fn get_open_orders(
        &self,
        _symbol: Option<&Symbol>,
    ) -> Result<Vec<OpenOrder>, GatewayError> {
        Ok(Vec::new())
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderId, GatewayError> {
        let n = self.place_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_orders.load(Ordering::SeqCst) {
            return Err(stub_failure("order"));
        }
        self.placed.lock().push(request.clone());
        Ok(OrderId(format!("stub-{n}")))
    }

    async fn cancel_order(&self, _order_id: &OrderId) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// One step of a scripted stream session
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Deliver a trade
    Trade(Trade),
    /// Wait before the next step
    Pause(Duration),
    /// End the current session cleanly
    Disconnect,
    /// End the current session with a transport error
    Fail,
}

#[derive(Default)]
struct ScriptState {
    steps: Mutex<VecDeque<ScriptStep>>,
    wake: Notify,
    connect_failures: AtomicU32,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    subscriptions: Mutex<Vec<String>>,
}

/// [`TradeSource`] replaying a script; idles once the script runs out
pub struct ScriptedTradeSource {
    state: Arc<ScriptState>,
    connected: bool,
}

/// Test-side handle for a [`ScriptedTradeSource`]
#[derive(Clone)]
pub struct ScriptedSourceHandle {
    state: Arc<ScriptState>,
}

impl ScriptedTradeSource {
    #[must_use]
    pub fn new(steps: Vec<ScriptStep>) -> (Self, ScriptedSourceHandle) {
        let state = Arc::new(ScriptState::default());
        state.steps.lock().extend(steps);
        (
            Self {
                state: Arc::clone(&state),
                connected: false,
            },
            ScriptedSourceHandle { state },
        )
    }
}

impl ScriptedSourceHandle {
    /// Append a step; wakes an idle session
    pub fn push(&self, step: ScriptStep) {
        self.state.steps.lock().push_back(step);
        self.state.wake.notify_one();
    }

    /// Refuse the next `n` connects
    pub fn fail_next_connects(&self, n: u32) {
        self.state.connect_failures.store(n, Ordering::SeqCst);
    }

    /// Connect attempts, successful or not
    #[must_use]
    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn disconnects(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    /// Symbols subscribed, one entry per subscribe call
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.state.subscriptions.lock().clone()
    }
}

#[async_trait::async_trait]
impl TradeSource for ScriptedTradeSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn connect(&mut self) -> anyhow::Result<()> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        let pending = self.state.connect_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.state
                .connect_failures
                .store(pending - 1, Ordering::SeqCst);
            anyhow::bail!("scripted connect refused");
        }
        self.connected = true;
        Ok(())
    }

    async fn subscribe(&mut self, symbol: &Symbol) -> anyhow::Result<()> {
        anyhow::ensure!(self.connected, "subscribe before connect");
        self.state
            .subscriptions
            .lock()
            .push(symbol.as_str().to_string());
        Ok(())
    }

    async fn run(&mut self, tx: mpsc::Sender<Trade>) -> anyhow::Result<()> {
        anyhow::ensure!(self.connected, "run before connect");
        loop {
            let next = self.state.steps.lock().pop_front();
            match next {
                Some(ScriptStep::Trade(trade)) => {
                    if tx.send(trade).await.is_err() {
                        return Ok(());
                    }
                }
                Some(ScriptStep::Pause(d)) => tokio::time::sleep(d).await,
                Some(ScriptStep::Disconnect) => return Ok(()),
                Some(ScriptStep::Fail) => anyhow::bail!("scripted transport failure"),
                None => self.state.wake.notified().await,
            }
        }
    }

    async fn disconnect(&mut self) -> anyhow::Result<()> {
        if self.connected {
            self.connected = false;
            self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Hand-driven [`Liveness`] for monitor tests
pub struct ManualLiveness {
    live: AtomicBool,
    last_event: Mutex<Instant>,
}

impl ManualLiveness {
    #[must_use]
    pub fn new(live: bool) -> Self {
        Self {
            live: AtomicBool::new(live),
            last_event: Mutex::new(Instant::now()),
        }
    }

    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::SeqCst);
    }

    /// Record a trade arriving now
    pub fn touch(&self) {
        *self.last_event.lock() = Instant::now();
    }
}

impl Liveness for ManualLiveness {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn last_event_at(&self) -> Instant {
        *self.last_event.lock()
    }
}

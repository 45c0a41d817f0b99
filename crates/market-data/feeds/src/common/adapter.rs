//! Trade source trait for streaming transports

use common::{Symbol, Trade};
use tokio::sync::mpsc;

/// Streaming trade transport
///
/// One implementation per transport. The stream connector owns the
/// reconnect loop; a source only has to open, subscribe and pump.
#[async_trait::async_trait]
pub trait TradeSource: Send {
    /// Transport name for logs
    fn name(&self) -> &str;

    /// Open the transport
    async fn connect(&mut self) -> anyhow::Result<()>;

    /// Subscribe to the trade channel of `symbol`.
    ///
    /// Called after every successful `connect`; repeating it must be harmless.
    async fn subscribe(&mut self, symbol: &Symbol) -> anyhow::Result<()>;

    /// Forward trades into `tx` until the transport closes (`Ok`) or fails (`Err`)
    async fn run(&mut self, tx: mpsc::Sender<Trade>) -> anyhow::Result<()>;

    /// Close the transport
    async fn disconnect(&mut self) -> anyhow::Result<()>;
}

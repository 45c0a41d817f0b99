//! Dual-source trade ingestion
//!
//! ```text
//! TradeSource -> StreamConnector --\
//!                                   +--> TradeRouter --> decision pipeline
//! ExchangeGateway -> PollingFallback-/       |
//!                       ^                   Watermark
//!                       |
//!            FailoverMonitor (reads ConnectorStatus)
//! ```

pub mod connector;
pub mod monitor;
pub mod poller;
pub mod router;
pub mod watermark;

pub use connector::{ConnectionState, ConnectorConfig, ConnectorStatus, Liveness, StreamConnector};
pub use monitor::{FailoverMonitor, MonitorConfig, PollMode, evaluate};
pub use poller::{PollReport, PollerConfig, PollingFallback};
pub use router::{RouterCounts, TradeRouter, Verdict};
pub use watermark::Watermark;

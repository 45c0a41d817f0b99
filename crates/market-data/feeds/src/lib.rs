//! Trade feeds for a single Wallex market
//!
//! Organized structure:
//! - common/: trade source and exchange gateway traits, payload parsing
//! - wallex/: REST gateway and Socket.IO trade stream
//! - ingest/: stream connector, failover monitor, polling fallback, router

#![deny(clippy::all)]

// Shared traits and parsing
pub mod common;

// Exchange-specific modules
pub mod wallex;

// Dual-source ingestion
pub mod ingest;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use self::common::adapter::TradeSource;
pub use self::common::gateway::{
    DepthSnapshot, ExchangeGateway, GatewayError, MarketInfo, OpenOrder, PriceLevel,
};
pub use ingest::{
    ConnectionState, ConnectorConfig, ConnectorStatus, FailoverMonitor, Liveness, MonitorConfig,
    PollMode, PollReport, PollerConfig, PollingFallback, RouterCounts, StreamConnector,
    TradeRouter, Verdict, Watermark,
};
pub use wallex::{WallexConfig, WallexRestClient, WallexTradeStream};

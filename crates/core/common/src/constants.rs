//! Shared constants
//!
//! Single source of truth for timing floors and buffer sizes

/// Time constants
pub mod time {
    pub const MILLIS_PER_SEC: u64 = 1000;
    pub const NANOS_PER_MILLI: u64 = 1_000_000;
}

/// Reconnect / polling limits
pub mod network {
    /// Floor for the stream reconnect delay
    pub const MIN_RECONNECT_DELAY_MS: u64 = 1000;
    /// Cap for the stream reconnect delay
    pub const MAX_RECONNECT_DELAY_MS: u64 = 10_000;
    /// Floor for the polling interval
    pub const MIN_POLL_INTERVAL_MS: u64 = 1000;
    /// Period of the failover monitor check
    pub const MONITOR_CHECK_INTERVAL_MS: u64 = 1000;
    /// Timeout for a single REST request
    pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 10;
    /// Timeout for the socket handshake
    pub const SOCKET_HANDSHAKE_TIMEOUT_SECS: u64 = 10;
}

/// Channel and window sizes
pub mod buffers {
    /// Router -> decision pipeline channel
    pub const TRADE_CHANNEL_SIZE: usize = 1000;
    /// Trade source -> connector channel
    pub const STREAM_CHANNEL_SIZE: usize = 1000;
    /// Trades retained by the decision pipeline
    pub const RECENT_TRADES_WINDOW: usize = 200;
    /// Trades handed to the advisory per call
    pub const ADVISORY_TRADE_SAMPLE: usize = 20;
}

/// Trading defaults
pub mod trading {
    /// Decimal places kept when sizing an order
    pub const QUANTITY_DECIMALS: u32 = 6;
}

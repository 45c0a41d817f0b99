//! Common types and utilities for the Wallex trade pipeline
//!
//! - `types`: symbols, trades, timestamps and order requests
//! - `errors`: validation errors for those types
//! - `shutdown`: cooperative stop signal for long-running loops
//! - `constants`: timing floors and buffer sizes

#![deny(clippy::all)]

pub mod constants;
pub mod errors;
pub mod shutdown;
pub mod types;

pub use errors::CommonError;
pub use shutdown::{Shutdown, ShutdownTrigger, shutdown_channel};
pub use types::{OrderId, OrderRequest, OrderType, Origin, Side, Symbol, Trade, Ts};

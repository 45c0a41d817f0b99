//! Single-symbol Wallex trader
//!
//! - `config`: environment-driven settings
//! - `telemetry`: tracing subscriber
//! - `runtime`: ingestion and decision tasks for one session
//! - `check`: connectivity check

#![deny(clippy::all)]

pub mod check;
pub mod config;
pub mod runtime;
pub mod telemetry;

pub use check::{CheckReport, Probe, run_check};
pub use config::{ConfigError, TraderConfig};
pub use runtime::{RunReport, TraderRuntime, startup_check};

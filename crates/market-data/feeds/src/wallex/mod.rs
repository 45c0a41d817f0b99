//! Wallex exchange integration
//!
//! - `rest`: HTTPS gateway for markets, trades, depth and orders
//! - `websocket`: Socket.IO trade subscription
//! - `socketio`: Engine.IO / Socket.IO text framing used by the stream

pub mod config;
pub mod rest;
pub mod socketio;
pub mod websocket;

pub use config::{DEFAULT_BASE_URL, WallexConfig};
pub use rest::WallexRestClient;
pub use websocket::WallexTradeStream;

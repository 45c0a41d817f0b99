//! Transport-independent pieces shared by every exchange integration

pub mod adapter;
pub mod gateway;
pub mod parser;

pub use adapter::TradeSource;
pub use gateway::{DepthSnapshot, ExchangeGateway, GatewayError, MarketInfo, OpenOrder, PriceLevel};

//! Binance USDT-M futures backend (REST + API-key HMAC signing).

mod client;
mod trader;
mod types;

pub use client::BinanceFuturesClient;
pub use trader::BinanceFuturesTrader;
pub use types::*;

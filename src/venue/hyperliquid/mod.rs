//! Hyperliquid backend (vendor-SDK delegated signing).

mod trader;

pub use trader::HyperliquidTrader;

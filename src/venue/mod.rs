//! Execution backends.
//!
//! One capability trait ([`VenueExecutor`]), four conforming
//! implementations: Binance futures, Aster, Hyperliquid and the in-memory
//! paper venue. The backend is chosen here, once, from configuration.

pub mod aster;
pub mod binance;
pub mod hyperliquid;
pub mod paper;
pub mod traits;
pub mod types;

pub use paper::PaperVenue;
pub use traits::{Venue, VenueExecutor};

use crate::config::Config;
use crate::error::{GatewayError, Result};
use std::sync::Arc;

/// Build the backend selected by `config.exchange`. Construction validates
/// credentials; a bad key fails here rather than on the first order.
pub async fn build_venue(config: &Config) -> Result<Arc<dyn VenueExecutor>> {
    match config.exchange.as_str() {
        "binance" => Ok(Arc::new(binance::BinanceFuturesTrader::new(
            &config.binance,
            &config.execution,
        )?)),
        "aster" => Ok(Arc::new(aster::AsterTrader::new(
            &config.aster,
            &config.execution,
        )?)),
        "hyperliquid" => Ok(Arc::new(
            hyperliquid::HyperliquidTrader::new(&config.hyperliquid, &config.execution).await?,
        )),
        "paper" => Ok(Arc::new(paper::PaperVenue::new(
            config.paper.starting_balance,
        ))),
        other => Err(GatewayError::Configuration(format!(
            "unsupported exchange: {other}"
        ))),
    }
}

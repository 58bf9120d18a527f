//! Venue-agnostic capability trait for trade execution.
//!
//! Three protocol-incompatible backends sit behind this one interface:
//! Binance USDT-M futures (REST + HMAC API key), Aster (EIP-191
//! wallet-signed REST) and Hyperliquid (vendor SDK). A paper venue conforms
//! too for dry runs and tests. The backend is picked once at construction by
//! configuration; callers never branch on the concrete type.

use crate::error::Result;
use crate::venue::types::{
    BalanceSnapshot, OrderAck, OrderRecord, PositionSide, PositionSnapshot,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::fmt;

/// Venue identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Venue {
    BinanceFutures,
    Aster,
    Hyperliquid,
    Paper,
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Venue::BinanceFutures => write!(f, "Binance Futures"),
            Venue::Aster => write!(f, "Aster"),
            Venue::Hyperliquid => write!(f, "Hyperliquid"),
            Venue::Paper => write!(f, "Paper"),
        }
    }
}

impl Venue {
    /// Short code for log lines (2-3 chars).
    pub fn short_code(&self) -> &'static str {
        match self {
            Venue::BinanceFutures => "BN",
            Venue::Aster => "AS",
            Venue::Hyperliquid => "HL",
            Venue::Paper => "PPR",
        }
    }
}

/// Unified execution capability over one venue account.
///
/// Results are normalized (see [`crate::venue::types`]) and every error is
/// explicit: an unknown symbol, a missing position or an invalid leverage
/// comes back as a value, never a panic.
#[async_trait]
pub trait VenueExecutor: Send + Sync {
    fn venue(&self) -> Venue;

    /// Account balance. Served from a short TTL cache.
    async fn get_balance(&self) -> Result<BalanceSnapshot>;

    /// All non-flat positions. Served from a short TTL cache.
    async fn get_positions(&self) -> Result<Vec<PositionSnapshot>>;

    /// Last traded / mid price for the symbol.
    async fn get_market_price(&self, symbol: &str) -> Result<Decimal>;

    /// Open a long position: cancels resting orders, pins leverage, then
    /// submits a synthetic market order rounded to venue precision.
    async fn open_long(&self, symbol: &str, quantity: Decimal, leverage: u32) -> Result<OrderAck>;

    /// Open a short position. Same flow as [`Self::open_long`].
    async fn open_short(&self, symbol: &str, quantity: Decimal, leverage: u32) -> Result<OrderAck>;

    /// Close a long position. `quantity = 0` closes the full position as
    /// reported by the current snapshot; absent position is an error and no
    /// order is submitted.
    async fn close_long(&self, symbol: &str, quantity: Decimal) -> Result<OrderAck>;

    /// Close a short position. Same contract as [`Self::close_long`].
    async fn close_short(&self, symbol: &str, quantity: Decimal) -> Result<OrderAck>;

    /// Set position leverage. Implementations skip the remote call when the
    /// last known leverage already matches.
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()>;

    /// Place a reduce-only stop-market order at `trigger_price`. The order
    /// side is opposite the position side.
    async fn set_stop_loss(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: Decimal,
        trigger_price: Decimal,
    ) -> Result<()>;

    /// Place a reduce-only take-profit-market order at `trigger_price`.
    async fn set_take_profit(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: Decimal,
        trigger_price: Decimal,
    ) -> Result<()>;

    /// Cancel every resting order for the symbol.
    async fn cancel_all_orders(&self, symbol: &str) -> Result<()>;

    /// Cancel only stop-loss/take-profit orders for the symbol, leaving
    /// other resting orders alone. Best-effort: partial cancel failures are
    /// logged and do not fail the call.
    async fn cancel_stop_orders(&self, symbol: &str) -> Result<()>;

    /// Venue-legal quantity string for the symbol.
    async fn format_quantity(&self, symbol: &str, quantity: Decimal) -> Result<String>;

    /// Completed (FILLED) orders in the window. Venues without a history
    /// endpoint return an empty list rather than an error.
    async fn get_order_history(
        &self,
        _start_time: Option<i64>,
        _end_time: Option<i64>,
        _limit: usize,
    ) -> Result<Vec<OrderRecord>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venue_display_and_codes() {
        assert_eq!(Venue::BinanceFutures.to_string(), "Binance Futures");
        assert_eq!(Venue::Hyperliquid.short_code(), "HL");
        assert_eq!(Venue::Aster.short_code(), "AS");
    }
}

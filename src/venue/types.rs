//! Normalized result schemas shared by every backend.
//!
//! Venue responses arrive in three incompatible shapes (Binance camelCase
//! JSON, Aster stringly-typed JSON, Hyperliquid SDK structs). Everything is
//! normalized into the fixed types below before it leaves a backend, so the
//! rest of the gateway never inspects venue-specific payloads.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Side of a held position. Always long/short; backends translate
/// signed-quantity conventions before this type is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// The order side that reduces a position on this side.
    pub fn closing_order_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }

    pub fn opposite(&self) -> PositionSide {
        match self {
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => write!(f, "long"),
            PositionSide::Short => write!(f, "short"),
        }
    }
}

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Account balance snapshot, normalized regardless of venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub wallet_balance: Decimal,
    pub available_balance: Decimal,
    pub unrealized_profit: Decimal,
}

impl BalanceSnapshot {
    /// Account equity. Every backend maintains the invariant
    /// `total_equity = wallet_balance + unrealized_profit`.
    pub fn total_equity(&self) -> Decimal {
        self.wallet_balance + self.unrealized_profit
    }
}

/// Open position snapshot, normalized regardless of venue.
/// `quantity` is always positive; direction lives in `side`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub leverage: u32,
    pub unrealized_pnl: Decimal,
    pub liquidation_price: Decimal,
}

/// Normalized order acknowledgement returned by open/close operations.
/// `order_id` is absent on venues that do not echo one back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: Option<u64>,
    pub symbol: String,
    pub status: String,
}

/// Completed-order history row. Only FILLED orders are reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: u64,
    pub symbol: String,
    pub side: OrderSide,
    pub position_side: String,
    pub order_type: String,
    pub executed_qty: Decimal,
    pub avg_price: Decimal,
    /// Notional value of the fill (`executed_qty * avg_price`).
    pub total_value: Decimal,
    /// Order creation time, epoch milliseconds.
    pub time: i64,
    /// Last update (fill) time, epoch milliseconds.
    pub update_time: i64,
}

/// Action requested by the decision engine for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentAction {
    OpenLong,
    OpenShort,
    CloseLong,
    CloseShort,
    UpdateStopLoss,
    UpdateTakeProfit,
    Hold,
    Wait,
}

impl IntentAction {
    pub fn is_open(&self) -> bool {
        matches!(self, IntentAction::OpenLong | IntentAction::OpenShort)
    }

    pub fn is_close(&self) -> bool {
        matches!(self, IntentAction::CloseLong | IntentAction::CloseShort)
    }
}

impl fmt::Display for IntentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntentAction::OpenLong => "open_long",
            IntentAction::OpenShort => "open_short",
            IntentAction::CloseLong => "close_long",
            IntentAction::CloseShort => "close_short",
            IntentAction::UpdateStopLoss => "update_stop_loss",
            IntentAction::UpdateTakeProfit => "update_take_profit",
            IntentAction::Hold => "hold",
            IntentAction::Wait => "wait",
        };
        write!(f, "{name}")
    }
}

/// One trade intent from the decision engine. Consumed read-only; validation
/// happens upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeIntent {
    pub symbol: String,
    pub action: IntentAction,
    #[serde(default)]
    pub leverage: Option<u32>,
    /// Explicit base-asset quantity. When absent for an open,
    /// `position_size_usd` is converted at the current market price.
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub position_size_usd: Option<Decimal>,
    #[serde(default)]
    pub stop_price: Option<Decimal>,
    #[serde(default)]
    pub take_profit_price: Option<Decimal>,
}

/// Outcome of executing a single intent. A cycle reports one of these per
/// intent so a failure never hides the fate of the others.
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub symbol: String,
    pub action: IntentAction,
    pub success: bool,
    pub order_id: Option<u64>,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}

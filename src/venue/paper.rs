//! In-memory paper-trading venue.
//!
//! Conforms to the same capability trait as the real backends so the whole
//! pipeline can run without risking funds. Fills are immediate at the seeded
//! mark price; stop and take-profit orders rest in memory so cancellation
//! flows behave like on a real venue. Doubles as the lifecycle test double.

use crate::error::{GatewayError, Result};
use crate::precision::format_with_precision;
use crate::venue::traits::{Venue, VenueExecutor};
use crate::venue::types::{
    BalanceSnapshot, OrderAck, OrderRecord, OrderSide, PositionSide, PositionSnapshot,
};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Simulated quantity precision for every symbol.
const PAPER_QTY_DECIMALS: u32 = 4;

#[derive(Debug, Clone)]
struct PaperPosition {
    quantity: Decimal,
    entry_price: Decimal,
    leverage: u32,
}

#[derive(Debug, Clone)]
struct PaperOrder {
    order_id: u64,
    symbol: String,
    order_type: String,
}

#[derive(Debug, Default)]
struct PaperState {
    balance: Decimal,
    positions: HashMap<(String, PositionSide), PaperPosition>,
    mark_prices: HashMap<String, Decimal>,
    open_orders: Vec<PaperOrder>,
    history: Vec<OrderRecord>,
    next_order_id: u64,
}

pub struct PaperVenue {
    state: RwLock<PaperState>,
}

impl PaperVenue {
    pub fn new(starting_balance: Decimal) -> Self {
        Self {
            state: RwLock::new(PaperState {
                balance: starting_balance,
                next_order_id: 1,
                ..PaperState::default()
            }),
        }
    }

    /// Seed or move the simulated mark price for a symbol.
    pub async fn set_mark_price(&self, symbol: &str, price: Decimal) {
        self.state
            .write()
            .await
            .mark_prices
            .insert(symbol.to_string(), price);
    }

    /// Resting orders for a symbol, for assertions and display.
    pub async fn resting_orders(&self, symbol: &str) -> Vec<(u64, String)> {
        self.state
            .read()
            .await
            .open_orders
            .iter()
            .filter(|o| o.symbol == symbol)
            .map(|o| (o.order_id, o.order_type.clone()))
            .collect()
    }

    fn price_of(state: &PaperState, symbol: &str) -> Result<Decimal> {
        state
            .mark_prices
            .get(symbol)
            .copied()
            .ok_or_else(|| GatewayError::SymbolNotFound(symbol.to_string()))
    }

    fn unrealized(position: &PaperPosition, side: PositionSide, mark: Decimal) -> Decimal {
        match side {
            PositionSide::Long => (mark - position.entry_price) * position.quantity,
            PositionSide::Short => (position.entry_price - mark) * position.quantity,
        }
    }

    fn record_fill(
        state: &mut PaperState,
        symbol: &str,
        order_side: OrderSide,
        position_side: PositionSide,
        order_type: &str,
        quantity: Decimal,
        price: Decimal,
    ) -> u64 {
        let order_id = state.next_order_id;
        state.next_order_id += 1;
        let now = Utc::now().timestamp_millis();
        state.history.push(OrderRecord {
            order_id,
            symbol: symbol.to_string(),
            side: order_side,
            position_side: match position_side {
                PositionSide::Long => "LONG".to_string(),
                PositionSide::Short => "SHORT".to_string(),
            },
            order_type: order_type.to_string(),
            executed_qty: quantity,
            avg_price: price,
            total_value: quantity * price,
            time: now,
            update_time: now,
        });
        order_id
    }

    fn drop_orders(state: &mut PaperState, symbol: &str, stops_only: bool) {
        state.open_orders.retain(|o| {
            o.symbol != symbol
                || (stops_only
                    && !matches!(
                        o.order_type.as_str(),
                        "STOP" | "STOP_MARKET" | "TAKE_PROFIT" | "TAKE_PROFIT_MARKET"
                    ))
        });
    }
}

#[async_trait]
impl VenueExecutor for PaperVenue {
    fn venue(&self) -> Venue {
        Venue::Paper
    }

    async fn get_balance(&self) -> Result<BalanceSnapshot> {
        let state = self.state.read().await;
        let mut unrealized = Decimal::ZERO;
        let mut margin_used = Decimal::ZERO;
        for ((symbol, side), position) in &state.positions {
            let mark = Self::price_of(&state, symbol)?;
            unrealized += Self::unrealized(position, *side, mark);
            if position.leverage > 0 {
                margin_used += position.quantity * mark / Decimal::from(position.leverage);
            }
        }
        Ok(BalanceSnapshot {
            wallet_balance: state.balance,
            available_balance: state.balance - margin_used,
            unrealized_profit: unrealized,
        })
    }

    async fn get_positions(&self) -> Result<Vec<PositionSnapshot>> {
        let state = self.state.read().await;
        let mut snapshots = Vec::new();
        for ((symbol, side), position) in &state.positions {
            let mark = Self::price_of(&state, symbol)?;
            snapshots.push(PositionSnapshot {
                symbol: symbol.clone(),
                side: *side,
                quantity: position.quantity,
                entry_price: position.entry_price,
                mark_price: mark,
                leverage: position.leverage,
                unrealized_pnl: Self::unrealized(position, *side, mark),
                liquidation_price: Decimal::ZERO,
            });
        }
        snapshots.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(snapshots)
    }

    async fn get_market_price(&self, symbol: &str) -> Result<Decimal> {
        let state = self.state.read().await;
        Self::price_of(&state, symbol)
    }

    async fn open_long(&self, symbol: &str, quantity: Decimal, leverage: u32) -> Result<OrderAck> {
        let mut state = self.state.write().await;
        let price = Self::price_of(&state, symbol)?;
        Self::drop_orders(&mut state, symbol, false);

        let key = (symbol.to_string(), PositionSide::Long);
        state.positions.insert(
            key,
            PaperPosition {
                quantity,
                entry_price: price,
                leverage,
            },
        );
        let order_id = Self::record_fill(
            &mut state,
            symbol,
            OrderSide::Buy,
            PositionSide::Long,
            "MARKET",
            quantity,
            price,
        );
        debug!(symbol, %quantity, order_id, "paper long opened");
        Ok(OrderAck {
            order_id: Some(order_id),
            symbol: symbol.to_string(),
            status: "FILLED".to_string(),
        })
    }

    async fn open_short(&self, symbol: &str, quantity: Decimal, leverage: u32) -> Result<OrderAck> {
        let mut state = self.state.write().await;
        let price = Self::price_of(&state, symbol)?;
        Self::drop_orders(&mut state, symbol, false);

        let key = (symbol.to_string(), PositionSide::Short);
        state.positions.insert(
            key,
            PaperPosition {
                quantity,
                entry_price: price,
                leverage,
            },
        );
        let order_id = Self::record_fill(
            &mut state,
            symbol,
            OrderSide::Sell,
            PositionSide::Short,
            "MARKET",
            quantity,
            price,
        );
        debug!(symbol, %quantity, order_id, "paper short opened");
        Ok(OrderAck {
            order_id: Some(order_id),
            symbol: symbol.to_string(),
            status: "FILLED".to_string(),
        })
    }

    async fn close_long(&self, symbol: &str, quantity: Decimal) -> Result<OrderAck> {
        self.close(symbol, PositionSide::Long, quantity).await
    }

    async fn close_short(&self, symbol: &str, quantity: Decimal) -> Result<OrderAck> {
        self.close(symbol, PositionSide::Short, quantity).await
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        let mut state = self.state.write().await;
        for ((pos_symbol, _), position) in state.positions.iter_mut() {
            if pos_symbol.as_str() == symbol {
                position.leverage = leverage;
            }
        }
        Ok(())
    }

    async fn set_stop_loss(
        &self,
        symbol: &str,
        _side: PositionSide,
        _quantity: Decimal,
        _trigger_price: Decimal,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let order_id = state.next_order_id;
        state.next_order_id += 1;
        state.open_orders.push(PaperOrder {
            order_id,
            symbol: symbol.to_string(),
            order_type: "STOP_MARKET".to_string(),
        });
        Ok(())
    }

    async fn set_take_profit(
        &self,
        symbol: &str,
        _side: PositionSide,
        _quantity: Decimal,
        _trigger_price: Decimal,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let order_id = state.next_order_id;
        state.next_order_id += 1;
        state.open_orders.push(PaperOrder {
            order_id,
            symbol: symbol.to_string(),
            order_type: "TAKE_PROFIT_MARKET".to_string(),
        });
        Ok(())
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<()> {
        let mut state = self.state.write().await;
        Self::drop_orders(&mut state, symbol, false);
        Ok(())
    }

    async fn cancel_stop_orders(&self, symbol: &str) -> Result<()> {
        let mut state = self.state.write().await;
        Self::drop_orders(&mut state, symbol, true);
        Ok(())
    }

    async fn format_quantity(&self, _symbol: &str, quantity: Decimal) -> Result<String> {
        Ok(format_with_precision(quantity, PAPER_QTY_DECIMALS))
    }

    async fn get_order_history(
        &self,
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: usize,
    ) -> Result<Vec<OrderRecord>> {
        let state = self.state.read().await;
        let limit = if limit == 0 { 500 } else { limit };
        let records = state
            .history
            .iter()
            .filter(|r| start_time.map_or(true, |t| r.time >= t))
            .filter(|r| end_time.map_or(true, |t| r.time <= t))
            .rev()
            .take(limit)
            .cloned()
            .collect();
        Ok(records)
    }
}

impl PaperVenue {
    async fn close(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: Decimal,
    ) -> Result<OrderAck> {
        let mut state = self.state.write().await;
        let price = Self::price_of(&state, symbol)?;
        let key = (symbol.to_string(), side);

        let position = state
            .positions
            .get(&key)
            .cloned()
            .ok_or_else(|| GatewayError::PositionNotFound {
                symbol: symbol.to_string(),
                side,
            })?;

        let close_qty = if quantity.is_zero() {
            position.quantity
        } else {
            quantity.min(position.quantity)
        };

        // Realize PnL on the closed fraction.
        let pnl = match side {
            PositionSide::Long => (price - position.entry_price) * close_qty,
            PositionSide::Short => (position.entry_price - price) * close_qty,
        };
        state.balance += pnl;

        if close_qty >= position.quantity {
            state.positions.remove(&key);
        } else if let Some(open) = state.positions.get_mut(&key) {
            open.quantity -= close_qty;
        }

        let order_id = Self::record_fill(
            &mut state,
            symbol,
            side.closing_order_side(),
            side,
            "MARKET",
            close_qty,
            price,
        );
        Self::drop_orders(&mut state, symbol, true);
        debug!(symbol, %side, %close_qty, pnl = %pnl, "paper position closed");
        Ok(OrderAck {
            order_id: Some(order_id),
            symbol: symbol.to_string(),
            status: "FILLED".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn venue_with_btc() -> PaperVenue {
        let venue = PaperVenue::new(dec!(10000));
        venue.set_mark_price("BTCUSDT", dec!(30000)).await;
        venue
    }

    #[tokio::test]
    async fn open_then_close_realizes_pnl() {
        let venue = venue_with_btc().await;
        venue.open_long("BTCUSDT", dec!(0.1), 5).await.unwrap();

        venue.set_mark_price("BTCUSDT", dec!(31000)).await;
        let positions = venue.get_positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].unrealized_pnl, dec!(100));

        venue.close_long("BTCUSDT", Decimal::ZERO).await.unwrap();
        let balance = venue.get_balance().await.unwrap();
        assert_eq!(balance.wallet_balance, dec!(10100));
        assert!(venue.get_positions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_without_position_is_an_error() {
        let venue = venue_with_btc().await;
        let err = venue.close_short("BTCUSDT", Decimal::ZERO).await.unwrap_err();
        assert!(matches!(err, GatewayError::PositionNotFound { .. }));
    }

    #[tokio::test]
    async fn closing_drops_resting_stop_orders() {
        let venue = venue_with_btc().await;
        venue.open_long("BTCUSDT", dec!(0.1), 5).await.unwrap();
        venue
            .set_stop_loss("BTCUSDT", PositionSide::Long, dec!(0.1), dec!(29000))
            .await
            .unwrap();
        venue
            .set_take_profit("BTCUSDT", PositionSide::Long, dec!(0.1), dec!(32000))
            .await
            .unwrap();
        assert_eq!(venue.resting_orders("BTCUSDT").await.len(), 2);

        venue.close_long("BTCUSDT", Decimal::ZERO).await.unwrap();
        assert!(venue.resting_orders("BTCUSDT").await.is_empty());
    }

    #[tokio::test]
    async fn cancel_stop_orders_leaves_other_symbols_alone() {
        let venue = venue_with_btc().await;
        venue.set_mark_price("ETHUSDT", dec!(2500)).await;
        venue
            .set_stop_loss("BTCUSDT", PositionSide::Long, dec!(0.1), dec!(29000))
            .await
            .unwrap();
        venue
            .set_stop_loss("ETHUSDT", PositionSide::Long, dec!(1), dec!(2300))
            .await
            .unwrap();

        venue.cancel_stop_orders("BTCUSDT").await.unwrap();
        assert!(venue.resting_orders("BTCUSDT").await.is_empty());
        assert_eq!(venue.resting_orders("ETHUSDT").await.len(), 1);
    }

    #[tokio::test]
    async fn history_reports_fills_newest_first() {
        let venue = venue_with_btc().await;
        venue.open_long("BTCUSDT", dec!(0.1), 5).await.unwrap();
        venue.close_long("BTCUSDT", Decimal::ZERO).await.unwrap();

        let history = venue.get_order_history(None, None, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].side, OrderSide::Sell);
        assert_eq!(history[1].side, OrderSide::Buy);
        assert_eq!(history[1].total_value, dec!(3000));
    }
}

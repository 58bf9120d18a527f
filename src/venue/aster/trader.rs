//! Aster backend: order lifecycle over the wallet-signed REST transport.
//!
//! The venue has no native market order, so opens and closes submit GTC
//! limit orders priced 1% through the market, biased toward immediate fill.

use crate::cache::TtlCache;
use crate::config::{AsterConfig, ExecutionConfig};
use crate::error::{GatewayError, Result};
use crate::precision::{PrecisionRegistry, PrecisionSpec};
use crate::venue::aster::client::AsterClient;
use crate::venue::aster::types::{ExchangeInfo, SymbolFilter, SymbolInfo};
use crate::venue::traits::{Venue, VenueExecutor};
use crate::venue::types::{
    BalanceSnapshot, OrderAck, OrderRecord, OrderSide, PositionSide, PositionSnapshot,
};
use async_trait::async_trait;
use reqwest::Method;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Aggressive limit offset: 1% through the market toward fill.
const SLIPPAGE_FACTOR_UP: Decimal = dec!(1.01);
const SLIPPAGE_FACTOR_DOWN: Decimal = dec!(0.99);

pub struct AsterTrader {
    client: AsterClient,
    precision: PrecisionRegistry,
    balance_cache: TtlCache<BalanceSnapshot>,
    position_cache: TtlCache<Vec<PositionSnapshot>>,
    known_leverage: RwLock<HashMap<String, u32>>,
}

impl AsterTrader {
    pub fn new(config: &AsterConfig, execution: &ExecutionConfig) -> Result<Self> {
        let client = AsterClient::new(config, execution.recv_window_ms)?;
        Ok(Self::with_client(client, execution))
    }

    /// Assemble from an existing client. Test hook.
    pub fn with_client(client: AsterClient, execution: &ExecutionConfig) -> Self {
        Self {
            client,
            precision: PrecisionRegistry::new(),
            balance_cache: TtlCache::new(execution.snapshot_ttl()),
            position_cache: TtlCache::new(execution.snapshot_ttl()),
            known_leverage: RwLock::new(HashMap::new()),
        }
    }

    fn spec_from_symbol_info(info: &SymbolInfo) -> PrecisionSpec {
        let mut spec = PrecisionSpec {
            price_precision: info.price_precision,
            quantity_precision: info.quantity_precision,
            tick_size: None,
            step_size: None,
        };
        for filter in &info.filters {
            match filter {
                SymbolFilter::Price { tick_size } => spec.tick_size = Some(*tick_size),
                SymbolFilter::LotSize { step_size } => spec.step_size = Some(*step_size),
                SymbolFilter::Other => {}
            }
        }
        spec
    }

    async fn resolve_precision(&self, symbol: &str) -> Result<PrecisionSpec> {
        if let Some(spec) = self.precision.get(symbol).await {
            return Ok(spec);
        }

        let info: ExchangeInfo = self.client.public_get("/fapi/v3/exchangeInfo", None).await?;
        let specs = info
            .symbols
            .iter()
            .map(|s| (s.symbol.clone(), Self::spec_from_symbol_info(s)))
            .collect();
        self.precision.populate(specs).await;

        self.precision
            .get(symbol)
            .await
            .ok_or_else(|| GatewayError::SymbolNotFound(symbol.to_string()))
    }

    /// Synthetic market order: GTC limit priced through the book on the
    /// side's fill direction.
    async fn submit_limit_order(
        &self,
        symbol: &str,
        order_side: OrderSide,
        quantity: Decimal,
    ) -> Result<OrderAck> {
        let market_price = self.get_market_price(symbol).await?;
        let factor = match order_side {
            OrderSide::Buy => SLIPPAGE_FACTOR_UP,
            OrderSide::Sell => SLIPPAGE_FACTOR_DOWN,
        };
        let limit_price = market_price * factor;

        let spec = self.resolve_precision(symbol).await?;
        let price_str = spec.format_price(limit_price);
        let quantity_str = spec.format_quantity(quantity);
        debug!(
            symbol,
            raw_price = %limit_price,
            price = %price_str,
            raw_quantity = %quantity,
            quantity = %quantity_str,
            "rounded order parameters to venue precision"
        );

        let mut params = Map::new();
        params.insert("symbol".to_string(), json!(symbol));
        params.insert("positionSide".to_string(), json!("BOTH"));
        params.insert("type".to_string(), json!("LIMIT"));
        params.insert("side".to_string(), json!(order_side.to_string()));
        params.insert("timeInForce".to_string(), json!("GTC"));
        params.insert("quantity".to_string(), json!(quantity_str));
        params.insert("price".to_string(), json!(price_str));

        let ack: super::types::OrderAckResponse = self
            .client
            .signed_request(Method::POST, "/fapi/v3/order", params)
            .await?;
        Ok(OrderAck {
            order_id: Some(ack.order_id),
            symbol: ack.symbol,
            status: ack.status,
        })
    }

    #[instrument(skip(self), fields(venue = "AS"))]
    async fn open_position(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: Decimal,
        leverage: u32,
    ) -> Result<OrderAck> {
        if let Err(e) = self.cancel_all_orders(symbol).await {
            warn!(symbol, error = %e, "failed to cancel resting orders before open, continuing");
        }
        self.set_leverage(symbol, leverage).await?;

        let order_side = match side {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        };
        let ack = self.submit_limit_order(symbol, order_side, quantity).await?;
        info!(symbol, %side, order_id = ?ack.order_id, "position opened");
        Ok(ack)
    }

    #[instrument(skip(self), fields(venue = "AS"))]
    async fn close_position(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: Decimal,
    ) -> Result<OrderAck> {
        let quantity = if quantity.is_zero() {
            self.get_positions()
                .await?
                .into_iter()
                .find(|p| p.symbol == symbol && p.side == side)
                .map(|p| p.quantity)
                .ok_or_else(|| GatewayError::PositionNotFound {
                    symbol: symbol.to_string(),
                    side,
                })?
        } else {
            quantity
        };

        let ack = self
            .submit_limit_order(symbol, side.closing_order_side(), quantity)
            .await?;
        info!(symbol, %side, order_id = ?ack.order_id, "position closed");

        if let Err(e) = self.cancel_all_orders(symbol).await {
            warn!(symbol, error = %e, "failed to cancel residual stop orders after close");
        }
        Ok(ack)
    }

    async fn place_trigger_order(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: Decimal,
        trigger_price: Decimal,
        order_type: &str,
    ) -> Result<()> {
        let spec = self.resolve_precision(symbol).await?;
        let price_str = spec.format_price(trigger_price);
        let quantity_str = spec.format_quantity(quantity);

        let mut params = Map::new();
        params.insert("symbol".to_string(), json!(symbol));
        params.insert("positionSide".to_string(), json!("BOTH"));
        params.insert("type".to_string(), json!(order_type));
        params.insert(
            "side".to_string(),
            json!(side.closing_order_side().to_string()),
        );
        params.insert("stopPrice".to_string(), json!(price_str));
        params.insert("quantity".to_string(), json!(quantity_str));
        params.insert("timeInForce".to_string(), json!("GTC"));

        let _: Value = self
            .client
            .signed_request(Method::POST, "/fapi/v3/order", params)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VenueExecutor for AsterTrader {
    fn venue(&self) -> Venue {
        Venue::Aster
    }

    async fn get_balance(&self) -> Result<BalanceSnapshot> {
        if let Some(balance) = self.balance_cache.get().await {
            debug!("serving balance from cache");
            return Ok(balance);
        }

        let balances: Vec<super::types::AssetBalance> = self
            .client
            .signed_request(Method::GET, "/fapi/v3/balance", Map::new())
            .await?;

        // The account is margined in USDT; other rows are dust.
        let balance = balances
            .iter()
            .find(|b| b.asset == "USDT")
            .map(|b| BalanceSnapshot {
                wallet_balance: b.balance,
                available_balance: b.available_balance,
                unrealized_profit: b.cross_un_pnl,
            })
            .unwrap_or(BalanceSnapshot {
                wallet_balance: Decimal::ZERO,
                available_balance: Decimal::ZERO,
                unrealized_profit: Decimal::ZERO,
            });
        self.balance_cache.put(balance.clone()).await;
        Ok(balance)
    }

    async fn get_positions(&self) -> Result<Vec<PositionSnapshot>> {
        if let Some(positions) = self.position_cache.get().await {
            debug!("serving positions from cache");
            return Ok(positions);
        }

        let raw: Vec<super::types::PositionEntry> = self
            .client
            .signed_request(Method::GET, "/fapi/v3/positionRisk", Map::new())
            .await?;
        let positions: Vec<PositionSnapshot> = raw
            .into_iter()
            .filter(|p| !p.position_amt.is_zero())
            .map(|p| {
                let side = if p.position_amt > Decimal::ZERO {
                    PositionSide::Long
                } else {
                    PositionSide::Short
                };
                PositionSnapshot {
                    symbol: p.symbol,
                    side,
                    quantity: p.position_amt.abs(),
                    entry_price: p.entry_price,
                    mark_price: p.mark_price,
                    leverage: p.leverage.to_u32().unwrap_or(1),
                    unrealized_pnl: p.unrealized_profit,
                    liquidation_price: p.liquidation_price,
                }
            })
            .collect();
        self.position_cache.put(positions.clone()).await;
        Ok(positions)
    }

    async fn get_market_price(&self, symbol: &str) -> Result<Decimal> {
        let query = format!("symbol={symbol}");
        let ticker: super::types::TickerPrice = self
            .client
            .public_get("/fapi/v3/ticker/price", Some(&query))
            .await?;
        Ok(ticker.price)
    }

    async fn open_long(&self, symbol: &str, quantity: Decimal, leverage: u32) -> Result<OrderAck> {
        self.open_position(symbol, PositionSide::Long, quantity, leverage)
            .await
    }

    async fn open_short(&self, symbol: &str, quantity: Decimal, leverage: u32) -> Result<OrderAck> {
        self.open_position(symbol, PositionSide::Short, quantity, leverage)
            .await
    }

    async fn close_long(&self, symbol: &str, quantity: Decimal) -> Result<OrderAck> {
        self.close_position(symbol, PositionSide::Long, quantity).await
    }

    async fn close_short(&self, symbol: &str, quantity: Decimal) -> Result<OrderAck> {
        self.close_position(symbol, PositionSide::Short, quantity).await
    }

    /// Idempotent: skipped when the last known leverage matches. The venue
    /// imposes no post-change cooldown.
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        if self.known_leverage.read().await.get(symbol) == Some(&leverage) {
            debug!(symbol, leverage, "leverage already set, skipping remote call");
            return Ok(());
        }

        let mut params = Map::new();
        params.insert("symbol".to_string(), json!(symbol));
        params.insert("leverage".to_string(), json!(leverage));
        let _: Value = self
            .client
            .signed_request(Method::POST, "/fapi/v3/leverage", params)
            .await?;

        self.known_leverage
            .write()
            .await
            .insert(symbol.to_string(), leverage);
        info!(symbol, leverage, "leverage changed");
        Ok(())
    }

    async fn set_stop_loss(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: Decimal,
        trigger_price: Decimal,
    ) -> Result<()> {
        self.place_trigger_order(symbol, side, quantity, trigger_price, "STOP_MARKET")
            .await
    }

    async fn set_take_profit(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: Decimal,
        trigger_price: Decimal,
    ) -> Result<()> {
        self.place_trigger_order(symbol, side, quantity, trigger_price, "TAKE_PROFIT_MARKET")
            .await
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<()> {
        let mut params = Map::new();
        params.insert("symbol".to_string(), json!(symbol));
        let _: Value = self
            .client
            .signed_request(Method::DELETE, "/fapi/v3/allOpenOrders", params)
            .await?;
        Ok(())
    }

    async fn cancel_stop_orders(&self, symbol: &str) -> Result<()> {
        let mut params = Map::new();
        params.insert("symbol".to_string(), json!(symbol));
        let orders: Vec<super::types::OpenOrder> = self
            .client
            .signed_request(Method::GET, "/fapi/v3/openOrders", params)
            .await?;

        let mut cancelled = 0usize;
        for order in orders.iter().filter(|o| o.is_stop_order()) {
            let mut cancel_params = Map::new();
            cancel_params.insert("symbol".to_string(), json!(symbol));
            cancel_params.insert("orderId".to_string(), json!(order.order_id));
            match self
                .client
                .signed_request::<Value>(Method::DELETE, "/fapi/v3/order", cancel_params)
                .await
            {
                Ok(_) => {
                    cancelled += 1;
                    debug!(symbol, order_id = order.order_id, order_type = %order.order_type, "stop order cancelled");
                }
                Err(e) => {
                    warn!(symbol, order_id = order.order_id, error = %e, "failed to cancel stop order");
                }
            }
        }
        info!(symbol, cancelled, "stop order cleanup finished");
        Ok(())
    }

    async fn format_quantity(&self, symbol: &str, quantity: Decimal) -> Result<String> {
        let spec = self.resolve_precision(symbol).await?;
        Ok(spec.format_quantity(quantity))
    }

    async fn get_order_history(
        &self,
        _start_time: Option<i64>,
        _end_time: Option<i64>,
        _limit: usize,
    ) -> Result<Vec<OrderRecord>> {
        // The venue exposes no usable order-history endpoint; degrade to an
        // empty list rather than an error.
        warn!("order history is not available on this venue");
        Ok(Vec::new())
    }
}

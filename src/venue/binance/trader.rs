//! Binance futures backend: order lifecycle on top of the signed client.

use crate::cache::TtlCache;
use crate::config::{BinanceConfig, ExecutionConfig};
use crate::error::{GatewayError, Result};
use crate::precision::{PrecisionRegistry, PrecisionSpec};
use crate::venue::binance::client::BinanceFuturesClient;
use crate::venue::binance::types::{FuturesSymbolInfo, SymbolFilter};
use crate::venue::traits::{Venue, VenueExecutor};
use crate::venue::types::{
    BalanceSnapshot, OrderAck, OrderRecord, OrderSide, PositionSide, PositionSnapshot,
};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Venue spelling of the hedge-mode position side.
fn position_side_param(side: PositionSide) -> &'static str {
    match side {
        PositionSide::Long => "LONG",
        PositionSide::Short => "SHORT",
    }
}

/// The venue reports this when leverage or margin type already matches.
const NO_CHANGE_NEEDED: &str = "No need to change";

pub struct BinanceFuturesTrader {
    client: BinanceFuturesClient,
    precision: PrecisionRegistry,
    balance_cache: TtlCache<BalanceSnapshot>,
    position_cache: TtlCache<Vec<PositionSnapshot>>,
    known_leverage: RwLock<HashMap<String, u32>>,
    leverage_cooldown: Duration,
    margin_type_cooldown: Duration,
}

impl BinanceFuturesTrader {
    pub fn new(config: &BinanceConfig, execution: &ExecutionConfig) -> Result<Self> {
        let client = BinanceFuturesClient::new(config)?;
        Ok(Self::with_client(client, execution))
    }

    /// Assemble from an existing client. Lets tests point at a mock server
    /// and zero out the cooldowns.
    pub fn with_client(client: BinanceFuturesClient, execution: &ExecutionConfig) -> Self {
        Self {
            client,
            precision: PrecisionRegistry::new(),
            balance_cache: TtlCache::new(execution.snapshot_ttl()),
            position_cache: TtlCache::new(execution.snapshot_ttl()),
            known_leverage: RwLock::new(HashMap::new()),
            leverage_cooldown: execution.leverage_cooldown(),
            margin_type_cooldown: execution.margin_type_cooldown(),
        }
    }

    fn spec_from_symbol_info(info: &FuturesSymbolInfo) -> PrecisionSpec {
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

    /// Look up the symbol's rounding rules, fetching exchange-wide metadata
    /// on the first miss. A symbol the venue does not list is fatal for the
    /// triggering action only.
    async fn resolve_precision(&self, symbol: &str) -> Result<PrecisionSpec> {
        if let Some(spec) = self.precision.get(symbol).await {
            return Ok(spec);
        }

        let info = self.client.exchange_info().await?;
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

    /// Pin isolated margin for the symbol, honoring the venue cooldown after
    /// an actual change. "Already isolated" is success.
    async fn ensure_isolated_margin(&self, symbol: &str) -> Result<()> {
        match self.client.set_margin_type(symbol, "ISOLATED").await {
            Ok(()) => {
                debug!(symbol, "margin type switched to isolated");
                if !self.margin_type_cooldown.is_zero() {
                    tokio::time::sleep(self.margin_type_cooldown).await;
                }
                Ok(())
            }
            Err(GatewayError::VenueRejection { body, .. }) if body.contains(NO_CHANGE_NEEDED) => {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn submit_market_order(
        &self,
        symbol: &str,
        order_side: OrderSide,
        position_side: PositionSide,
        quantity_str: String,
    ) -> Result<OrderAck> {
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("side".to_string(), order_side.to_string()),
            (
                "positionSide".to_string(),
                position_side_param(position_side).to_string(),
            ),
            ("type".to_string(), "MARKET".to_string()),
            ("quantity".to_string(), quantity_str),
        ];
        let order = self.client.place_order(params).await?;
        Ok(OrderAck {
            order_id: Some(order.order_id),
            symbol: order.symbol,
            status: order.status,
        })
    }

    #[instrument(skip(self), fields(venue = "BN"))]
    async fn open_position(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: Decimal,
        leverage: u32,
    ) -> Result<OrderAck> {
        // Stale resting orders (old stops) would stack onto the new position.
        if let Err(e) = self.cancel_all_orders(symbol).await {
            warn!(symbol, error = %e, "failed to cancel resting orders before open, continuing");
        }

        self.set_leverage(symbol, leverage).await?;
        self.ensure_isolated_margin(symbol).await?;

        let spec = self.resolve_precision(symbol).await?;
        let quantity_str = spec.format_quantity(quantity);

        let order_side = match side {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        };
        let ack = self
            .submit_market_order(symbol, order_side, side, quantity_str)
            .await?;
        info!(symbol, %side, order_id = ?ack.order_id, "position opened");
        Ok(ack)
    }

    #[instrument(skip(self), fields(venue = "BN"))]
    async fn close_position(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: Decimal,
    ) -> Result<OrderAck> {
        // Zero means the whole position as the current snapshot reports it.
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

        let spec = self.resolve_precision(symbol).await?;
        let quantity_str = spec.format_quantity(quantity);

        let ack = self
            .submit_market_order(symbol, side.closing_order_side(), side, quantity_str)
            .await?;
        info!(symbol, %side, order_id = ?ack.order_id, "position closed");

        // Residual stop/take-profit orders would fire against nothing.
        if let Err(e) = self.cancel_all_orders(symbol).await {
            warn!(symbol, error = %e, "failed to cancel residual stop orders after close");
        }
        Ok(ack)
    }

    async fn place_trigger_order(
        &self,
        symbol: &str,
        side: PositionSide,
        trigger_price: Decimal,
        order_type: &str,
    ) -> Result<()> {
        let spec = self.resolve_precision(symbol).await?;
        // closePosition=true makes this a close-all trigger; the venue
        // rejects an explicit quantity alongside it.
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("side".to_string(), side.closing_order_side().to_string()),
            (
                "positionSide".to_string(),
                position_side_param(side).to_string(),
            ),
            ("type".to_string(), order_type.to_string()),
            ("stopPrice".to_string(), spec.format_price(trigger_price)),
            ("closePosition".to_string(), "true".to_string()),
            ("workingType".to_string(), "CONTRACT_PRICE".to_string()),
        ];
        self.client.place_order(params).await?;
        Ok(())
    }
}

#[async_trait]
impl VenueExecutor for BinanceFuturesTrader {
    fn venue(&self) -> Venue {
        Venue::BinanceFutures
    }

    async fn get_balance(&self) -> Result<BalanceSnapshot> {
        if let Some(balance) = self.balance_cache.get().await {
            debug!("serving balance from cache");
            return Ok(balance);
        }

        let account = self.client.account().await?;
        let balance = BalanceSnapshot {
            wallet_balance: account.total_wallet_balance,
            available_balance: account.available_balance,
            unrealized_profit: account.total_unrealized_profit,
        };
        self.balance_cache.put(balance.clone()).await;
        Ok(balance)
    }

    async fn get_positions(&self) -> Result<Vec<PositionSnapshot>> {
        if let Some(positions) = self.position_cache.get().await {
            debug!("serving positions from cache");
            return Ok(positions);
        }

        let raw = self.client.position_risk().await?;
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
        Ok(self.client.ticker_price(symbol).await?.price)
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

    /// Idempotent: the remote call is skipped when the last known leverage
    /// already matches, and "No need to change" from the venue is success.
    /// An actual change blocks for the venue's cooldown window.
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        if self.known_leverage.read().await.get(symbol) == Some(&leverage) {
            debug!(symbol, leverage, "leverage already set, skipping remote call");
            return Ok(());
        }

        // The live snapshot may already report the target leverage.
        if let Ok(positions) = self.get_positions().await {
            if positions
                .iter()
                .any(|p| p.symbol == symbol && p.leverage == leverage)
            {
                self.known_leverage
                    .write()
                    .await
                    .insert(symbol.to_string(), leverage);
                debug!(symbol, leverage, "position already at target leverage");
                return Ok(());
            }
        }

        match self.client.set_leverage(symbol, leverage).await {
            Ok(()) => {
                info!(symbol, leverage, "leverage changed");
                self.known_leverage
                    .write()
                    .await
                    .insert(symbol.to_string(), leverage);
                if !self.leverage_cooldown.is_zero() {
                    debug!(
                        cooldown_secs = self.leverage_cooldown.as_secs(),
                        "waiting out leverage-change cooldown"
                    );
                    tokio::time::sleep(self.leverage_cooldown).await;
                }
                Ok(())
            }
            Err(GatewayError::VenueRejection { body, .. }) if body.contains(NO_CHANGE_NEEDED) => {
                self.known_leverage
                    .write()
                    .await
                    .insert(symbol.to_string(), leverage);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn set_stop_loss(
        &self,
        symbol: &str,
        side: PositionSide,
        _quantity: Decimal,
        trigger_price: Decimal,
    ) -> Result<()> {
        self.place_trigger_order(symbol, side, trigger_price, "STOP_MARKET")
            .await
    }

    async fn set_take_profit(
        &self,
        symbol: &str,
        side: PositionSide,
        _quantity: Decimal,
        trigger_price: Decimal,
    ) -> Result<()> {
        self.place_trigger_order(symbol, side, trigger_price, "TAKE_PROFIT_MARKET")
            .await
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<()> {
        self.client.cancel_all_orders(symbol).await
    }

    /// Cancels only stop-loss/take-profit orders, leaving resting limits in
    /// place. Best-effort: a failed cancel is logged and the loop continues.
    async fn cancel_stop_orders(&self, symbol: &str) -> Result<()> {
        let orders = self.client.open_orders(symbol).await?;

        let mut cancelled = 0usize;
        for order in orders.iter().filter(|o| o.is_stop_order()) {
            match self.client.cancel_order(symbol, order.order_id).await {
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
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: usize,
    ) -> Result<Vec<OrderRecord>> {
        // Venue caps the page size at 1000.
        let limit = if limit == 0 { 500 } else { limit.min(1000) };
        let orders = self.client.all_orders(start_time, end_time, limit).await?;

        let records = orders
            .into_iter()
            .filter(|o| o.status == "FILLED")
            .map(|o| {
                let side = if o.side == "BUY" {
                    OrderSide::Buy
                } else {
                    OrderSide::Sell
                };
                OrderRecord {
                    order_id: o.order_id,
                    symbol: o.symbol,
                    side,
                    position_side: o.position_side,
                    order_type: o.order_type,
                    total_value: o.executed_qty * o.avg_price,
                    executed_qty: o.executed_qty,
                    avg_price: o.avg_price,
                    time: o.time,
                    update_time: o.update_time,
                }
            })
            .collect();
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BinanceConfig;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_execution() -> ExecutionConfig {
        ExecutionConfig {
            snapshot_ttl_secs: 15,
            action_pause_secs: 0,
            leverage_cooldown_secs: 0,
            margin_type_cooldown_secs: 0,
            recv_window_ms: 50_000,
        }
    }

    async fn trader_for(server: &MockServer) -> BinanceFuturesTrader {
        let config = BinanceConfig {
            api_key: "test-key".to_string(),
            secret_key: "test-secret".to_string(),
            testnet: false,
        };
        let client = BinanceFuturesClient::with_base_url(&config, &server.uri()).unwrap();
        BinanceFuturesTrader::with_client(client, &fast_execution())
    }

    fn positions_body(entries: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_string(format!("[{entries}]"))
    }

    const LONG_BTC: &str = r#"{
        "symbol": "BTCUSDT", "positionAmt": "0.500", "entryPrice": "30000",
        "markPrice": "31000", "unRealizedProfit": "500", "leverage": "10",
        "liquidationPrice": "27000"
    }"#;

    #[tokio::test]
    async fn balance_is_cached_within_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v2/account"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"totalWalletBalance":"1000","totalUnrealizedProfit":"10","availableBalance":"900"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let trader = trader_for(&server).await;
        let first = trader.get_balance().await.unwrap();
        let second = trader.get_balance().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.total_equity(), dec!(1010));
    }

    #[tokio::test]
    async fn set_leverage_twice_issues_one_remote_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v2/positionRisk"))
            .respond_with(positions_body(""))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/fapi/v1/leverage"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"symbol":"BTCUSDT","leverage":10,"maxNotionalValue":"1000000"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let trader = trader_for(&server).await;
        trader.set_leverage("BTCUSDT", 10).await.unwrap();
        trader.set_leverage("BTCUSDT", 10).await.unwrap();
    }

    #[tokio::test]
    async fn set_leverage_skips_when_snapshot_matches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v2/positionRisk"))
            .respond_with(positions_body(LONG_BTC))
            .mount(&server)
            .await;
        // No /fapi/v1/leverage mock: a POST there would 404 and fail the test.

        let trader = trader_for(&server).await;
        trader.set_leverage("BTCUSDT", 10).await.unwrap();
    }

    #[tokio::test]
    async fn close_without_position_issues_zero_order_calls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v2/positionRisk"))
            .respond_with(positions_body(""))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/fapi/v1/order"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(0)
            .mount(&server)
            .await;

        let trader = trader_for(&server).await;
        let err = trader.close_long("BTCUSDT", Decimal::ZERO).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::PositionNotFound { ref symbol, side: PositionSide::Long } if symbol == "BTCUSDT"
        ));
    }

    #[tokio::test]
    async fn cancel_stop_orders_skips_plain_limits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/openOrders"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[
                    {"orderId": 1, "symbol": "BTCUSDT", "type": "LIMIT"},
                    {"orderId": 2, "symbol": "BTCUSDT", "type": "STOP_MARKET"},
                    {"orderId": 3, "symbol": "BTCUSDT", "type": "TAKE_PROFIT_MARKET"}
                ]"#,
            ))
            .expect(1)
            .mount(&server)
            .await;
        let cancel_body =
            r#"{"orderId": 2, "symbol": "BTCUSDT", "status": "CANCELED"}"#;
        Mock::given(method("DELETE"))
            .and(path("/fapi/v1/order"))
            .and(query_param("orderId", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(cancel_body))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/fapi/v1/order"))
            .and(query_param("orderId", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"orderId": 3, "symbol": "BTCUSDT", "status": "CANCELED"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let trader = trader_for(&server).await;
        trader.cancel_stop_orders("BTCUSDT").await.unwrap();
        // The limit order (orderId 1) must survive: only ids 2 and 3 were
        // matched by the DELETE mocks, and both expectations are exact.
    }

    #[tokio::test]
    async fn partial_cancel_failure_does_not_abort_cleanup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/openOrders"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[
                    {"orderId": 2, "symbol": "BTCUSDT", "type": "STOP_MARKET"},
                    {"orderId": 3, "symbol": "BTCUSDT", "type": "TAKE_PROFIT_MARKET"}
                ]"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/fapi/v1/order"))
            .and(query_param("orderId", "2"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                r#"{"code":-2011,"msg":"Unknown order sent."}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/fapi/v1/order"))
            .and(query_param("orderId", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"orderId": 3, "symbol": "BTCUSDT", "status": "CANCELED"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let trader = trader_for(&server).await;
        // Returns success even though one cancel was rejected.
        trader.cancel_stop_orders("BTCUSDT").await.unwrap();
    }

    #[tokio::test]
    async fn open_long_runs_full_preparation_flow() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/fapi/v1/allOpenOrders"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"code":200}"#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fapi/v2/positionRisk"))
            .respond_with(positions_body(""))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/fapi/v1/leverage"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"symbol":"BTCUSDT","leverage":5,"maxNotionalValue":"1000000"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/fapi/v1/marginType"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                r#"{"code":-4046,"msg":"No need to change margin type."}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/exchangeInfo"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"symbols":[{"symbol":"BTCUSDT","pricePrecision":2,"quantityPrecision":3,
                    "filters":[{"filterType":"LOT_SIZE","stepSize":"0.001"}]}]}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/fapi/v1/order"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"orderId": 42, "symbol": "BTCUSDT", "status": "NEW"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let trader = trader_for(&server).await;
        let ack = trader.open_long("BTCUSDT", dec!(0.5004), 5).await.unwrap();
        assert_eq!(ack.order_id, Some(42));
        assert_eq!(ack.status, "NEW");

        // The submitted quantity was rounded to the step size.
        let order_request = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.url.path() == "/fapi/v1/order")
            .unwrap();
        let query = order_request.url.query().unwrap();
        assert!(query.contains("quantity=0.5"));
        assert!(query.contains("type=MARKET"));
        assert!(query.contains("positionSide=LONG"));
    }

    #[tokio::test]
    async fn stop_loss_is_close_all_trigger_on_opposite_side() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/exchangeInfo"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"symbols":[{"symbol":"BTCUSDT","pricePrecision":2,"quantityPrecision":3,
                    "filters":[{"filterType":"PRICE_FILTER","tickSize":"0.01"}]}]}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/fapi/v1/order"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"orderId": 77, "symbol": "BTCUSDT", "status": "NEW"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let trader = trader_for(&server).await;
        trader
            .set_stop_loss("BTCUSDT", PositionSide::Long, dec!(0.5), dec!(29000.237))
            .await
            .unwrap();

        let order_request = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.url.path() == "/fapi/v1/order")
            .unwrap();
        let query = order_request.url.query().unwrap();
        assert!(query.contains("type=STOP_MARKET"));
        assert!(query.contains("side=SELL"));
        assert!(query.contains("stopPrice=29000.24"));
        assert!(query.contains("closePosition=true"));
    }
}

//! Hyperliquid backend, delegated to the vendor SDK.
//!
//! The gateway only prepares normalized order parameters; request signing
//! and nonce management live inside `hyperliquid_rust_sdk`. Two venue rules
//! still apply on our side: sizes round to the asset's `szDecimals`, and
//! prices quantize to 5 significant figures.

use crate::cache::TtlCache;
use crate::config::{ExecutionConfig, HyperliquidConfig};
use crate::error::{GatewayError, Result};
use crate::precision::{format_with_precision, round_half_up, round_sig_figs};
use crate::venue::traits::{Venue, VenueExecutor};
use crate::venue::types::{BalanceSnapshot, OrderAck, PositionSide, PositionSnapshot};
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use hyperliquid_rust_sdk::{
    BaseUrl, ClientCancelRequest, ClientLimit, ClientOrder, ClientOrderRequest, ClientTrigger,
    ExchangeClient, ExchangeDataStatus, ExchangeResponseStatus, InfoClient, UserStateResponse,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Price quantization rule: 5 significant figures.
const PRICE_SIG_FIGS: u32 = 5;

/// Size precision fallback for assets missing from the cached metadata.
const DEFAULT_SZ_DECIMALS: u32 = 4;

/// Aggressive limit offset for IOC synthetic market orders.
const SLIPPAGE_FACTOR_UP: Decimal = dec!(1.01);
const SLIPPAGE_FACTOR_DOWN: Decimal = dec!(0.99);

/// "BTCUSDT" -> "BTC": the venue names perpetuals by bare coin.
fn coin_from_symbol(symbol: &str) -> String {
    symbol.strip_suffix("USDT").unwrap_or(symbol).to_string()
}

/// "BTC" -> "BTCUSDT": normalized symbol used everywhere else.
fn symbol_from_coin(coin: &str) -> String {
    format!("{coin}USDT")
}

fn parse_decimal(raw: &str, what: &str) -> Result<Decimal> {
    Decimal::from_str(raw).map_err(|e| GatewayError::Parse(format!("{what} `{raw}`: {e}")))
}

fn to_f64(value: Decimal, what: &str) -> Result<f64> {
    value
        .to_f64()
        .ok_or_else(|| GatewayError::Parse(format!("{what} {value} is not representable")))
}

pub struct HyperliquidTrader {
    exchange: ExchangeClient,
    info: InfoClient,
    wallet_address: Address,
    balance_cache: TtlCache<BalanceSnapshot>,
    position_cache: TtlCache<Vec<PositionSnapshot>>,
    known_leverage: RwLock<HashMap<String, u32>>,
}

impl HyperliquidTrader {
    /// Connects both SDK clients and fetches asset metadata (`szDecimals`
    /// et al) once for the process lifetime.
    pub async fn new(config: &HyperliquidConfig, execution: &ExecutionConfig) -> Result<Self> {
        let wallet: PrivateKeySigner = config
            .private_key
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| GatewayError::Configuration(format!("private key: {e}")))?;
        let wallet_address: Address = config
            .wallet_address
            .parse()
            .map_err(|e| GatewayError::Configuration(format!("wallet address: {e}")))?;

        let base_url = if config.testnet {
            BaseUrl::Testnet
        } else {
            BaseUrl::Mainnet
        };
        let exchange = ExchangeClient::new(None, wallet, Some(base_url), None, None).await?;
        let base_url = if config.testnet {
            BaseUrl::Testnet
        } else {
            BaseUrl::Mainnet
        };
        let info = InfoClient::new(None, Some(base_url)).await?;

        info!(
            wallet = %wallet_address,
            testnet = config.testnet,
            assets = exchange.meta.universe.len(),
            "hyperliquid trader initialized"
        );

        Ok(Self {
            exchange,
            info,
            wallet_address,
            balance_cache: TtlCache::new(execution.snapshot_ttl()),
            position_cache: TtlCache::new(execution.snapshot_ttl()),
            known_leverage: RwLock::new(HashMap::new()),
        })
    }

    fn sz_decimals(&self, coin: &str) -> u32 {
        self.exchange
            .meta
            .universe
            .iter()
            .find(|asset| asset.name == coin)
            .map(|asset| asset.sz_decimals)
            .unwrap_or_else(|| {
                warn!(coin, "no size precision metadata, using default");
                DEFAULT_SZ_DECIMALS
            })
    }

    fn round_size(&self, coin: &str, quantity: Decimal) -> Decimal {
        round_half_up(quantity, self.sz_decimals(coin))
    }

    async fn user_state(&self) -> Result<UserStateResponse> {
        Ok(self.info.user_state(self.wallet_address).await?)
    }

    fn balance_from_state(state: &UserStateResponse) -> Result<BalanceSnapshot> {
        let account_value = parse_decimal(&state.margin_summary.account_value, "account value")?;
        let margin_used =
            parse_decimal(&state.margin_summary.total_margin_used, "margin used")?;

        // Account value already contains unrealized PnL; back it out so the
        // equity invariant (wallet + unrealized) holds like everywhere else.
        let mut unrealized = Decimal::ZERO;
        for entry in &state.asset_positions {
            unrealized += parse_decimal(&entry.position.unrealized_pnl, "unrealized pnl")?;
        }

        Ok(BalanceSnapshot {
            wallet_balance: account_value - unrealized,
            available_balance: account_value - margin_used,
            unrealized_profit: unrealized,
        })
    }

    fn positions_from_state(state: &UserStateResponse) -> Result<Vec<PositionSnapshot>> {
        let mut positions = Vec::new();
        for entry in &state.asset_positions {
            let position = &entry.position;
            let signed_qty = parse_decimal(&position.szi, "position size")?;
            if signed_qty.is_zero() {
                continue;
            }

            let side = if signed_qty > Decimal::ZERO {
                PositionSide::Long
            } else {
                PositionSide::Short
            };
            let quantity = signed_qty.abs();

            let entry_price = match &position.entry_px {
                Some(px) => parse_decimal(px, "entry price")?,
                None => Decimal::ZERO,
            };
            let liquidation_price = match &position.liquidation_px {
                Some(px) => parse_decimal(px, "liquidation price")?,
                None => Decimal::ZERO,
            };
            let position_value = parse_decimal(&position.position_value, "position value")?;
            let unrealized_pnl = parse_decimal(&position.unrealized_pnl, "unrealized pnl")?;
            // The venue reports notional value, not mark price.
            let mark_price = position_value / quantity;

            positions.push(PositionSnapshot {
                symbol: symbol_from_coin(&position.coin),
                side,
                quantity,
                entry_price,
                mark_price,
                leverage: position.leverage.value,
                unrealized_pnl,
                liquidation_price,
            });
        }
        Ok(positions)
    }

    fn ack_from_status(symbol: &str, status: ExchangeResponseStatus) -> Result<OrderAck> {
        match status {
            ExchangeResponseStatus::Err(message) => Err(GatewayError::Sdk(message)),
            ExchangeResponseStatus::Ok(response) => {
                let first = response
                    .data
                    .and_then(|data| data.statuses.into_iter().next());
                match first {
                    Some(ExchangeDataStatus::Error(message)) => Err(GatewayError::Sdk(message)),
                    Some(ExchangeDataStatus::Filled(order)) => Ok(OrderAck {
                        order_id: Some(order.oid),
                        symbol: symbol.to_string(),
                        status: "FILLED".to_string(),
                    }),
                    Some(ExchangeDataStatus::Resting(order)) => Ok(OrderAck {
                        order_id: Some(order.oid),
                        symbol: symbol.to_string(),
                        status: "NEW".to_string(),
                    }),
                    _ => Ok(OrderAck {
                        order_id: None,
                        symbol: symbol.to_string(),
                        status: "FILLED".to_string(),
                    }),
                }
            }
        }
    }

    fn unit_from_status(status: ExchangeResponseStatus, what: &str) -> Result<()> {
        match status {
            ExchangeResponseStatus::Ok(_) => Ok(()),
            ExchangeResponseStatus::Err(message) => {
                Err(GatewayError::Sdk(format!("{what}: {message}")))
            }
        }
    }

    /// Synthetic market order: IOC limit priced 1% through the market with
    /// the venue's 5-sig-fig price quantization.
    async fn submit_ioc_order(
        &self,
        symbol: &str,
        is_buy: bool,
        quantity: Decimal,
        reduce_only: bool,
    ) -> Result<OrderAck> {
        let coin = coin_from_symbol(symbol);
        let market_price = self.get_market_price(symbol).await?;
        let factor = if is_buy {
            SLIPPAGE_FACTOR_UP
        } else {
            SLIPPAGE_FACTOR_DOWN
        };

        let size = self.round_size(&coin, quantity);
        let price = round_sig_figs(market_price * factor, PRICE_SIG_FIGS);
        debug!(
            symbol,
            raw_quantity = %quantity,
            size = %size,
            price = %price,
            "rounded order parameters to venue precision"
        );

        let request = ClientOrderRequest {
            asset: coin,
            is_buy,
            reduce_only,
            limit_px: to_f64(price, "price")?,
            sz: to_f64(size, "size")?,
            cloid: None,
            order_type: ClientOrder::Limit(ClientLimit {
                tif: "Ioc".to_string(),
            }),
        };
        let status = self.exchange.order(request, None).await?;
        Self::ack_from_status(symbol, status)
    }

    #[instrument(skip(self), fields(venue = "HL"))]
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

        let ack = self
            .submit_ioc_order(symbol, side == PositionSide::Long, quantity, false)
            .await?;
        info!(symbol, %side, order_id = ?ack.order_id, "position opened");
        Ok(ack)
    }

    #[instrument(skip(self), fields(venue = "HL"))]
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

        // Reduce-only so a stale size can never flip the position.
        let ack = self
            .submit_ioc_order(symbol, side == PositionSide::Short, quantity, true)
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
        tpsl: &str,
    ) -> Result<()> {
        let coin = coin_from_symbol(symbol);
        let size = self.round_size(&coin, quantity);
        let price = round_sig_figs(trigger_price, PRICE_SIG_FIGS);
        let trigger_px = to_f64(price, "trigger price")?;

        let request = ClientOrderRequest {
            asset: coin,
            is_buy: side == PositionSide::Short,
            reduce_only: true,
            limit_px: trigger_px,
            sz: to_f64(size, "size")?,
            cloid: None,
            order_type: ClientOrder::Trigger(ClientTrigger {
                is_market: true,
                trigger_px,
                tpsl: tpsl.to_string(),
            }),
        };
        let status = self.exchange.order(request, None).await?;
        Self::unit_from_status(status, "trigger order")
    }
}

#[async_trait]
impl VenueExecutor for HyperliquidTrader {
    fn venue(&self) -> Venue {
        Venue::Hyperliquid
    }

    async fn get_balance(&self) -> Result<BalanceSnapshot> {
        if let Some(balance) = self.balance_cache.get().await {
            debug!("serving balance from cache");
            return Ok(balance);
        }

        let state = self.user_state().await?;
        let balance = Self::balance_from_state(&state)?;
        self.balance_cache.put(balance.clone()).await;
        Ok(balance)
    }

    async fn get_positions(&self) -> Result<Vec<PositionSnapshot>> {
        if let Some(positions) = self.position_cache.get().await {
            debug!("serving positions from cache");
            return Ok(positions);
        }

        let state = self.user_state().await?;
        let positions = Self::positions_from_state(&state)?;
        self.position_cache.put(positions.clone()).await;
        Ok(positions)
    }

    async fn get_market_price(&self, symbol: &str) -> Result<Decimal> {
        let coin = coin_from_symbol(symbol);
        let mids = self.info.all_mids().await?;
        let raw = mids
            .get(&coin)
            .ok_or_else(|| GatewayError::SymbolNotFound(symbol.to_string()))?;
        parse_decimal(raw, "mid price")
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

    /// Isolated margin, idempotent via the last-known map. The venue has no
    /// leverage-change cooldown.
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        if self.known_leverage.read().await.get(symbol) == Some(&leverage) {
            debug!(symbol, leverage, "leverage already set, skipping remote call");
            return Ok(());
        }

        let coin = coin_from_symbol(symbol);
        let status = self
            .exchange
            .update_leverage(leverage, &coin, false, None)
            .await?;
        Self::unit_from_status(status, "update leverage")?;

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
        self.place_trigger_order(symbol, side, quantity, trigger_price, "sl")
            .await
    }

    async fn set_take_profit(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: Decimal,
        trigger_price: Decimal,
    ) -> Result<()> {
        self.place_trigger_order(symbol, side, quantity, trigger_price, "tp")
            .await
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<()> {
        let coin = coin_from_symbol(symbol);
        let open_orders = self.info.open_orders(self.wallet_address).await?;

        for order in open_orders.iter().filter(|o| o.coin == coin) {
            let cancel = ClientCancelRequest {
                asset: coin.clone(),
                oid: order.oid,
            };
            match self.exchange.cancel(cancel, None).await {
                Ok(status) => {
                    if let Err(e) = Self::unit_from_status(status, "cancel") {
                        warn!(symbol, oid = order.oid, error = %e, "failed to cancel order");
                    }
                }
                Err(e) => warn!(symbol, oid = order.oid, error = %e, "failed to cancel order"),
            }
        }
        debug!(symbol, "resting orders cancelled");
        Ok(())
    }

    /// The open-order list does not expose trigger metadata, so stop
    /// cleanup degrades to cancel-all; the caller replaces the stops it
    /// wants right after.
    async fn cancel_stop_orders(&self, symbol: &str) -> Result<()> {
        self.cancel_all_orders(symbol).await
    }

    async fn format_quantity(&self, symbol: &str, quantity: Decimal) -> Result<String> {
        let coin = coin_from_symbol(symbol);
        let decimals = self.sz_decimals(&coin);
        Ok(format_with_precision(quantity, decimals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_coin_mapping_round_trips() {
        assert_eq!(coin_from_symbol("BTCUSDT"), "BTC");
        assert_eq!(coin_from_symbol("BTC"), "BTC");
        assert_eq!(symbol_from_coin("ETH"), "ETHUSDT");
    }

    #[test]
    fn ioc_prices_quantize_to_five_sig_figs() {
        // 31337.42 * 1.01 = 31650.7942 -> 31651
        let price = round_sig_figs(dec!(31337.42) * SLIPPAGE_FACTOR_UP, PRICE_SIG_FIGS);
        assert_eq!(price, dec!(31651));
        // Sub-dollar assets keep their magnitude.
        let price = round_sig_figs(dec!(0.123456) * SLIPPAGE_FACTOR_DOWN, PRICE_SIG_FIGS);
        assert_eq!(price, dec!(0.12222));
    }

    #[test]
    fn decimal_parsing_reports_the_field() {
        let err = parse_decimal("not-a-number", "mid price").unwrap_err();
        assert!(err.to_string().contains("mid price"));
    }
}

//! Sequential intent execution for one decision cycle.
//!
//! The orchestrator hands over a validated batch of trade intents; this
//! module orders it (closes before opens), runs each intent against the
//! configured backend and reports one [`ActionOutcome`] per intent. A
//! failing action never aborts the rest of the cycle, and each successful
//! action is followed by a fixed pause so the venue is not burst.

use crate::error::{GatewayError, Result};
use crate::sequencer::sequence;
use crate::venue::types::{
    ActionOutcome, IntentAction, PositionSide, TradeIntent,
};
use crate::venue::VenueExecutor;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Leverage applied when the decision engine omits one.
const DEFAULT_LEVERAGE: u32 = 1;

enum TriggerKind {
    StopLoss,
    TakeProfit,
}

pub struct IntentExecutor {
    venue: Arc<dyn VenueExecutor>,
    action_pause: Duration,
}

impl IntentExecutor {
    pub fn new(venue: Arc<dyn VenueExecutor>, action_pause: Duration) -> Self {
        Self {
            venue,
            action_pause,
        }
    }

    /// Execute a full cycle: sequence the batch, run intents one at a time,
    /// isolate failures.
    pub async fn execute_batch(&self, intents: Vec<TradeIntent>) -> Vec<ActionOutcome> {
        let batch = sequence(intents);
        info!(
            count = batch.len(),
            venue = %self.venue.venue(),
            "executing decision cycle (closes before opens)"
        );

        let mut outcomes = Vec::with_capacity(batch.len());
        for intent in &batch {
            match self.execute_intent(intent).await {
                Ok(order_id) => {
                    info!(symbol = %intent.symbol, action = %intent.action, ?order_id, "action succeeded");
                    outcomes.push(ActionOutcome {
                        symbol: intent.symbol.clone(),
                        action: intent.action,
                        success: true,
                        order_id,
                        error: None,
                        executed_at: Utc::now(),
                    });
                    if !self.action_pause.is_zero() {
                        tokio::time::sleep(self.action_pause).await;
                    }
                }
                Err(e) => {
                    warn!(symbol = %intent.symbol, action = %intent.action, error = %e, "action failed, continuing cycle");
                    outcomes.push(ActionOutcome {
                        symbol: intent.symbol.clone(),
                        action: intent.action,
                        success: false,
                        order_id: None,
                        error: Some(e.to_string()),
                        executed_at: Utc::now(),
                    });
                }
            }
        }
        outcomes
    }

    async fn execute_intent(&self, intent: &TradeIntent) -> Result<Option<u64>> {
        match intent.action {
            IntentAction::OpenLong => self.open(intent, PositionSide::Long).await,
            IntentAction::OpenShort => self.open(intent, PositionSide::Short).await,
            IntentAction::CloseLong => self.close(intent, PositionSide::Long).await,
            IntentAction::CloseShort => self.close(intent, PositionSide::Short).await,
            IntentAction::UpdateStopLoss => {
                self.update_trigger(intent, TriggerKind::StopLoss).await
            }
            IntentAction::UpdateTakeProfit => {
                self.update_trigger(intent, TriggerKind::TakeProfit).await
            }
            IntentAction::Hold | IntentAction::Wait => Ok(None),
        }
    }

    /// Resolve the order quantity: explicit quantity wins, otherwise the
    /// USD notional is converted at the current market price.
    async fn resolve_quantity(&self, intent: &TradeIntent) -> Result<Decimal> {
        if let Some(quantity) = intent.quantity {
            if !quantity.is_zero() {
                return Ok(quantity);
            }
        }
        let size_usd = intent.position_size_usd.ok_or_else(|| {
            GatewayError::InvalidIntent(format!(
                "{} {} carries neither quantity nor position_size_usd",
                intent.symbol, intent.action
            ))
        })?;
        let price = self.venue.get_market_price(&intent.symbol).await?;
        if price <= Decimal::ZERO {
            return Err(GatewayError::Parse(format!(
                "non-positive market price for {}",
                intent.symbol
            )));
        }
        Ok(size_usd / price)
    }

    async fn open(&self, intent: &TradeIntent, side: PositionSide) -> Result<Option<u64>> {
        // Opening into an existing same-side position would stack exposure
        // past the intended size; a flip must close first.
        if let Ok(positions) = self.venue.get_positions().await {
            if positions
                .iter()
                .any(|p| p.symbol == intent.symbol && p.side == side)
            {
                return Err(GatewayError::PositionConflict {
                    symbol: intent.symbol.clone(),
                    side,
                });
            }
        }

        let quantity = self.resolve_quantity(intent).await?;
        let leverage = intent.leverage.unwrap_or(DEFAULT_LEVERAGE);

        let ack = match side {
            PositionSide::Long => self.venue.open_long(&intent.symbol, quantity, leverage).await?,
            PositionSide::Short => {
                self.venue
                    .open_short(&intent.symbol, quantity, leverage)
                    .await?
            }
        };

        // Protective orders are best-effort: the position is live either way.
        if let Some(stop_price) = intent.stop_price {
            if let Err(e) = self
                .venue
                .set_stop_loss(&intent.symbol, side, quantity, stop_price)
                .await
            {
                warn!(symbol = %intent.symbol, error = %e, "failed to attach stop loss");
            }
        }
        if let Some(take_profit) = intent.take_profit_price {
            if let Err(e) = self
                .venue
                .set_take_profit(&intent.symbol, side, quantity, take_profit)
                .await
            {
                warn!(symbol = %intent.symbol, error = %e, "failed to attach take profit");
            }
        }

        Ok(ack.order_id)
    }

    async fn close(&self, intent: &TradeIntent, side: PositionSide) -> Result<Option<u64>> {
        // Zero quantity = close everything the snapshot reports.
        let quantity = intent.quantity.unwrap_or(Decimal::ZERO);
        let ack = match side {
            PositionSide::Long => self.venue.close_long(&intent.symbol, quantity).await?,
            PositionSide::Short => self.venue.close_short(&intent.symbol, quantity).await?,
        };
        Ok(ack.order_id)
    }

    /// Replace the protective order for an existing position: cancel the
    /// old stops (best-effort), then place the new trigger sized to the
    /// live position.
    async fn update_trigger(
        &self,
        intent: &TradeIntent,
        kind: TriggerKind,
    ) -> Result<Option<u64>> {
        let positions = self.venue.get_positions().await?;
        let position = positions
            .iter()
            .find(|p| p.symbol == intent.symbol)
            .ok_or_else(|| GatewayError::NoPositionForSymbol(intent.symbol.clone()))?;

        let trigger_price = match kind {
            TriggerKind::StopLoss => intent.stop_price,
            TriggerKind::TakeProfit => intent.take_profit_price,
        }
        .ok_or_else(|| {
            GatewayError::InvalidIntent(format!(
                "{} {} carries no trigger price",
                intent.symbol, intent.action
            ))
        })?;

        if let Err(e) = self.venue.cancel_stop_orders(&intent.symbol).await {
            warn!(symbol = %intent.symbol, error = %e, "failed to cancel existing stop orders");
        }

        match kind {
            TriggerKind::StopLoss => {
                self.venue
                    .set_stop_loss(
                        &intent.symbol,
                        position.side,
                        position.quantity,
                        trigger_price,
                    )
                    .await?
            }
            TriggerKind::TakeProfit => {
                self.venue
                    .set_take_profit(
                        &intent.symbol,
                        position.side,
                        position.quantity,
                        trigger_price,
                    )
                    .await?
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::PaperVenue;
    use rust_decimal_macros::dec;

    fn intent(symbol: &str, action: IntentAction) -> TradeIntent {
        TradeIntent {
            symbol: symbol.to_string(),
            action,
            leverage: Some(5),
            quantity: Some(dec!(0.1)),
            position_size_usd: None,
            stop_price: None,
            take_profit_price: None,
        }
    }

    async fn executor_with_btc() -> (Arc<PaperVenue>, IntentExecutor) {
        let venue = Arc::new(PaperVenue::new(dec!(10000)));
        venue.set_mark_price("BTCUSDT", dec!(30000)).await;
        let executor = IntentExecutor::new(venue.clone(), Duration::ZERO);
        (venue, executor)
    }

    #[tokio::test]
    async fn flip_closes_the_old_side_before_opening_the_new() {
        let (venue, executor) = executor_with_btc().await;
        venue.open_short("BTCUSDT", dec!(0.1), 5).await.unwrap();

        let outcomes = executor
            .execute_batch(vec![
                intent("BTCUSDT", IntentAction::OpenLong),
                intent("BTCUSDT", IntentAction::CloseShort),
            ])
            .await;

        assert!(outcomes.iter().all(|o| o.success), "{outcomes:?}");
        assert_eq!(outcomes[0].action, IntentAction::CloseShort);
        assert_eq!(outcomes[1].action, IntentAction::OpenLong);

        let positions = venue.get_positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].side, PositionSide::Long);
    }

    #[tokio::test]
    async fn opening_into_same_side_position_is_rejected() {
        let (venue, executor) = executor_with_btc().await;
        venue.open_long("BTCUSDT", dec!(0.2), 5).await.unwrap();
        let opens_before = venue.get_order_history(None, None, 100).await.unwrap().len();

        let outcomes = executor
            .execute_batch(vec![intent("BTCUSDT", IntentAction::OpenLong)])
            .await;

        assert!(!outcomes[0].success);
        assert!(outcomes[0].error.as_ref().unwrap().contains("already has an open long"));
        // No order reached the venue.
        let opens_after = venue.get_order_history(None, None, 100).await.unwrap().len();
        assert_eq!(opens_before, opens_after);
    }

    #[tokio::test]
    async fn usd_notional_converts_to_quantity_at_market_price() {
        let (venue, executor) = executor_with_btc().await;
        let mut open = intent("BTCUSDT", IntentAction::OpenLong);
        open.quantity = None;
        open.position_size_usd = Some(dec!(3000));

        let outcomes = executor.execute_batch(vec![open]).await;
        assert!(outcomes[0].success, "{outcomes:?}");

        let positions = venue.get_positions().await.unwrap();
        assert_eq!(positions[0].quantity, dec!(0.1));
    }

    #[tokio::test]
    async fn protective_orders_attach_after_open() {
        let (venue, executor) = executor_with_btc().await;
        let mut open = intent("BTCUSDT", IntentAction::OpenLong);
        open.stop_price = Some(dec!(29000));
        open.take_profit_price = Some(dec!(32000));

        let outcomes = executor.execute_batch(vec![open]).await;
        assert!(outcomes[0].success);

        let resting = venue.resting_orders("BTCUSDT").await;
        let types: Vec<&str> = resting.iter().map(|(_, t)| t.as_str()).collect();
        assert!(types.contains(&"STOP_MARKET"));
        assert!(types.contains(&"TAKE_PROFIT_MARKET"));
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_cycle() {
        let (_venue, executor) = executor_with_btc().await;
        let outcomes = executor
            .execute_batch(vec![
                intent("BTCUSDT", IntentAction::CloseLong), // nothing to close
                intent("ETHUSDT", IntentAction::Hold),
            ])
            .await;

        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].success);
        assert!(outcomes[1].success);
        assert!(outcomes[1].order_id.is_none());
    }

    #[tokio::test]
    async fn update_stop_loss_replaces_the_resting_stop() {
        let (venue, executor) = executor_with_btc().await;
        venue.open_long("BTCUSDT", dec!(0.1), 5).await.unwrap();
        venue
            .set_stop_loss("BTCUSDT", PositionSide::Long, dec!(0.1), dec!(28000))
            .await
            .unwrap();

        let mut update = intent("BTCUSDT", IntentAction::UpdateStopLoss);
        update.stop_price = Some(dec!(29500));
        let outcomes = executor.execute_batch(vec![update]).await;
        assert!(outcomes[0].success, "{outcomes:?}");

        let resting = venue.resting_orders("BTCUSDT").await;
        assert_eq!(resting.len(), 1);
        assert_eq!(resting[0].1, "STOP_MARKET");
    }

    #[tokio::test]
    async fn update_without_position_reports_the_symbol() {
        let (_venue, executor) = executor_with_btc().await;
        let mut update = intent("ETHUSDT", IntentAction::UpdateTakeProfit);
        update.take_profit_price = Some(dec!(2800));

        let outcomes = executor.execute_batch(vec![update]).await;
        assert!(!outcomes[0].success);
        assert!(outcomes[0].error.as_ref().unwrap().contains("ETHUSDT"));
    }
}

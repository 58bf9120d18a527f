//! Execution ordering for one decision cycle.
//!
//! A cycle may both close one side of a symbol and open the other ("flip").
//! Executing the open first would briefly double the account's exposure and
//! can breach position limits, so every close runs before every open. The
//! sort is stable: intents within the same class keep their submitted order.

use crate::venue::types::{IntentAction, TradeIntent};

/// Execution priority class. Lower runs first.
fn priority(action: IntentAction) -> u8 {
    match action {
        IntentAction::CloseLong | IntentAction::CloseShort => 0,
        IntentAction::OpenLong | IntentAction::OpenShort => 1,
        IntentAction::Hold | IntentAction::Wait => 2,
        // Stop/target adjustments act on positions that already exist and
        // are safe to run after everything else.
        IntentAction::UpdateStopLoss | IntentAction::UpdateTakeProfit => 3,
    }
}

/// Order a batch so closes precede opens precede hold/wait. Pure and
/// idempotent; batches are small so the stable sort cost is irrelevant.
pub fn sequence(intents: Vec<TradeIntent>) -> Vec<TradeIntent> {
    let mut sorted = intents;
    sorted.sort_by_key(|intent| priority(intent.action));
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(symbol: &str, action: IntentAction) -> TradeIntent {
        TradeIntent {
            symbol: symbol.to_string(),
            action,
            leverage: None,
            quantity: None,
            position_size_usd: None,
            stop_price: None,
            take_profit_price: None,
        }
    }

    fn actions(batch: &[TradeIntent]) -> Vec<IntentAction> {
        batch.iter().map(|i| i.action).collect()
    }

    #[test]
    fn closes_run_before_opens_before_holds() {
        let batch = vec![
            intent("BTCUSDT", IntentAction::OpenLong),
            intent("BTCUSDT", IntentAction::CloseShort),
            intent("ETHUSDT", IntentAction::Hold),
        ];
        let sorted = sequence(batch);
        assert_eq!(
            actions(&sorted),
            vec![IntentAction::CloseShort, IntentAction::OpenLong, IntentAction::Hold]
        );
        assert_eq!(sorted[0].symbol, "BTCUSDT");
        assert_eq!(sorted[2].symbol, "ETHUSDT");
    }

    #[test]
    fn every_permutation_preserves_the_class_order() {
        let base = vec![
            intent("A", IntentAction::Hold),
            intent("B", IntentAction::OpenShort),
            intent("C", IntentAction::CloseLong),
            intent("D", IntentAction::Wait),
            intent("E", IntentAction::OpenLong),
            intent("F", IntentAction::CloseShort),
        ];

        // Rotations are enough to vary which class arrives first.
        for shift in 0..base.len() {
            let mut batch = base.clone();
            batch.rotate_left(shift);
            let sorted = sequence(batch);

            let last_close = sorted.iter().rposition(|i| i.action.is_close());
            let first_open = sorted.iter().position(|i| i.action.is_open());
            let first_rest = sorted
                .iter()
                .position(|i| !i.action.is_close() && !i.action.is_open());

            assert!(last_close.unwrap() < first_open.unwrap());
            assert!(first_open.unwrap() < first_rest.unwrap());
        }
    }

    #[test]
    fn sorting_is_stable_within_a_class() {
        let batch = vec![
            intent("FIRST", IntentAction::OpenLong),
            intent("SECOND", IntentAction::OpenShort),
            intent("THIRD", IntentAction::OpenLong),
        ];
        let sorted = sequence(batch);
        let symbols: Vec<&str> = sorted.iter().map(|i| i.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["FIRST", "SECOND", "THIRD"]);
    }

    #[test]
    fn resorting_a_sorted_batch_is_a_noop() {
        let batch = vec![
            intent("A", IntentAction::OpenLong),
            intent("B", IntentAction::CloseShort),
            intent("C", IntentAction::Hold),
            intent("D", IntentAction::UpdateStopLoss),
        ];
        let once = sequence(batch);
        let twice = sequence(once.clone());
        assert_eq!(actions(&once), actions(&twice));
        let once_symbols: Vec<_> = once.iter().map(|i| i.symbol.clone()).collect();
        let twice_symbols: Vec<_> = twice.iter().map(|i| i.symbol.clone()).collect();
        assert_eq!(once_symbols, twice_symbols);
    }

    #[test]
    fn stop_adjustments_run_last() {
        let batch = vec![
            intent("A", IntentAction::UpdateTakeProfit),
            intent("B", IntentAction::Hold),
            intent("C", IntentAction::OpenLong),
        ];
        let sorted = sequence(batch);
        assert_eq!(
            actions(&sorted),
            vec![IntentAction::OpenLong, IntentAction::Hold, IntentAction::UpdateTakeProfit]
        );
    }

    #[test]
    fn empty_and_singleton_batches_pass_through() {
        assert!(sequence(Vec::new()).is_empty());
        let one = sequence(vec![intent("A", IntentAction::Wait)]);
        assert_eq!(one.len(), 1);
    }
}

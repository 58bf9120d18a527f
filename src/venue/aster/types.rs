//! Wire types for the Aster futures REST API (Binance-compatible surface).

use rust_decimal::Decimal;
use serde::Deserialize;

/// One asset row from `/fapi/v3/balance`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetBalance {
    pub asset: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub available_balance: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub cross_un_pnl: Decimal,
}

/// Position entry from `/fapi/v3/positionRisk`. Signed quantity convention:
/// negative `position_amt` means short.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionEntry {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub position_amt: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub entry_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub mark_price: Decimal,
    #[serde(rename = "unRealizedProfit", with = "rust_decimal::serde::str")]
    pub unrealized_profit: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub leverage: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub liquidation_price: Decimal,
}

/// Exchange information (`/fapi/v3/exchangeInfo`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    pub price_precision: u32,
    pub quantity_precision: u32,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "filterType")]
pub enum SymbolFilter {
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    Price {
        #[serde(with = "rust_decimal::serde::str")]
        tick_size: Decimal,
    },
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize {
        #[serde(with = "rust_decimal::serde::str")]
        step_size: Decimal,
    },
    #[serde(other)]
    Other,
}

/// Last price (`/fapi/v3/ticker/price`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerPrice {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
}

/// Order acknowledgement from `/fapi/v3/order`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAckResponse {
    pub order_id: u64,
    pub symbol: String,
    pub status: String,
}

/// Resting order from `/fapi/v3/openOrders`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrder {
    pub order_id: u64,
    pub symbol: String,
    #[serde(rename = "type")]
    pub order_type: String,
}

impl OpenOrder {
    pub fn is_stop_order(&self) -> bool {
        matches!(
            self.order_type.as_str(),
            "STOP" | "STOP_MARKET" | "TAKE_PROFIT" | "TAKE_PROFIT_MARKET"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_balance_rows() {
        let raw = r#"[
            {"asset":"USDT","balance":"1500.00","availableBalance":"1200.00","crossUnPnl":"-12.5"},
            {"asset":"BNB","balance":"0.1","availableBalance":"0.1","crossUnPnl":"0"}
        ]"#;
        let balances: Vec<AssetBalance> = serde_json::from_str(raw).unwrap();
        let usdt = balances.iter().find(|b| b.asset == "USDT").unwrap();
        assert_eq!(usdt.balance, dec!(1500));
        assert_eq!(usdt.cross_un_pnl, dec!(-12.5));
    }

    #[test]
    fn stop_filter_matches_trigger_types_only() {
        let order = |t: &str| OpenOrder {
            order_id: 9,
            symbol: "XUSDT".to_string(),
            order_type: t.to_string(),
        };
        assert!(order("STOP").is_stop_order());
        assert!(order("TAKE_PROFIT_MARKET").is_stop_order());
        assert!(!order("LIMIT").is_stop_order());
    }
}

//! Per-symbol rounding rules and decimal helpers.
//!
//! Venues reject orders whose price or quantity is not an exact multiple of
//! the symbol's tick/step size, so every outgoing value passes through a
//! [`PrecisionSpec`] first. Specs are fetched lazily (one exchange-wide
//! metadata call) and cached for the process lifetime; venue metadata is
//! assumed static during a run.

use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Rounding rules for one symbol. Immutable once fetched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrecisionSpec {
    pub price_precision: u32,
    pub quantity_precision: u32,
    /// Minimum price increment, when the venue publishes one.
    pub tick_size: Option<Decimal>,
    /// Minimum quantity increment, when the venue publishes one.
    pub step_size: Option<Decimal>,
}

impl PrecisionSpec {
    /// Round a price to the symbol's tick size, falling back to decimal
    /// precision when no tick is published.
    pub fn round_price(&self, price: Decimal) -> Decimal {
        match self.tick_size {
            Some(tick) if tick > Decimal::ZERO => round_to_tick(price, tick),
            _ => round_half_up(price, self.price_precision),
        }
    }

    /// Round a quantity to the symbol's step size, falling back to decimal
    /// precision when no step is published.
    pub fn round_quantity(&self, quantity: Decimal) -> Decimal {
        match self.step_size {
            Some(step) if step > Decimal::ZERO => round_to_tick(quantity, step),
            _ => round_half_up(quantity, self.quantity_precision),
        }
    }

    /// Venue-legal price string: rounded, trailing zeros trimmed.
    pub fn format_price(&self, price: Decimal) -> String {
        format_with_precision(self.round_price(price), self.price_precision)
    }

    /// Venue-legal quantity string: rounded, trailing zeros trimmed.
    pub fn format_quantity(&self, quantity: Decimal) -> String {
        format_with_precision(self.round_quantity(quantity), self.quantity_precision)
    }
}

/// Round to the nearest integer multiple of `tick`.
pub fn round_to_tick(value: Decimal, tick: Decimal) -> Decimal {
    if tick <= Decimal::ZERO {
        return value;
    }
    (value / tick).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero) * tick
}

/// Round to `decimals` places, midpoints away from zero.
pub fn round_half_up(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
}

/// Round to `figures` significant digits independent of magnitude.
/// Hyperliquid quantizes prices to 5 significant figures.
pub fn round_sig_figs(value: Decimal, figures: u32) -> Decimal {
    if value.is_zero() {
        return value;
    }
    value
        .round_sf_with_strategy(figures, RoundingStrategy::MidpointAwayFromZero)
        .unwrap_or(value)
}

/// Format with at most `decimals` places and no trailing zeros.
pub fn format_with_precision(value: Decimal, decimals: u32) -> String {
    round_half_up(value, decimals).normalize().to_string()
}

/// Process-lifetime cache of per-symbol rounding rules.
///
/// Reads take the read lock on the fast path; a miss lets the owning backend
/// fetch exchange-wide metadata and populate everything in one write.
#[derive(Debug, Default)]
pub struct PrecisionRegistry {
    specs: RwLock<HashMap<String, PrecisionSpec>>,
}

impl PrecisionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, symbol: &str) -> Option<PrecisionSpec> {
        self.specs.read().await.get(symbol).cloned()
    }

    /// Merge freshly fetched specs. Existing entries are overwritten; the
    /// fetch is exchange-wide so this normally runs once per process.
    pub async fn populate(&self, specs: HashMap<String, PrecisionSpec>) {
        self.specs.write().await.extend(specs);
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.specs.read().await.len()
    }
}

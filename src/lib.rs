//! # Perp Gateway
//!
//! Multi-venue execution gateway for perpetual futures trading. One
//! capability interface, three protocol-incompatible backends (Binance
//! futures, Aster, Hyperliquid) plus an in-memory paper venue, producing
//! venue-legal orders under retryable network failure with no
//! duplicate-order risk.
//!
//! ## Architecture
//!
//! - `config`: Configuration loading and validation
//! - `error`: Gateway error taxonomy (retry policy is encoded in the types)
//! - `precision`: Per-symbol rounding rules, lazily fetched and cached
//! - `cache`: TTL caches for rate-limited account endpoints
//! - `sequencer`: Orders a decision batch so closes run before opens
//! - `executor`: Sequential intent execution with per-action isolation
//! - `venue`: Capability trait and the per-venue backends

pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod precision;
pub mod sequencer;
pub mod venue;

pub use config::Config;
pub use error::{GatewayError, Result};
pub use executor::IntentExecutor;
pub use venue::{build_venue, Venue, VenueExecutor};

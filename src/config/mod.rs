//! Gateway configuration.
//!
//! Loaded from a `config.*` file layered with `GATEWAY_`-prefixed
//! environment variables (and `.env` via dotenvy). The selected venue's
//! credentials are validated up front; bad key material is fatal at
//! construction, not at first use.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Active backend: "binance", "aster", "hyperliquid" or "paper".
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default)]
    pub binance: BinanceConfig,
    #[serde(default)]
    pub aster: AsterConfig,
    #[serde(default)]
    pub hyperliquid: HyperliquidConfig,
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// Binance API credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BinanceConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub testnet: bool,
}

/// Aster API-wallet credentials. The main wallet address identifies the
/// account; the API wallet's key signs requests on its behalf.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AsterConfig {
    /// Main wallet address (ERC-20, the login identity).
    #[serde(default)]
    pub user_address: String,
    /// API wallet address registered with the venue.
    #[serde(default)]
    pub signer_address: String,
    /// API wallet private key, hex (with or without 0x prefix).
    #[serde(default)]
    pub private_key: String,
}

/// Hyperliquid credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HyperliquidConfig {
    /// Signing key, hex.
    #[serde(default)]
    pub private_key: String,
    /// Account wallet address queried for state.
    #[serde(default)]
    pub wallet_address: String,
    #[serde(default)]
    pub testnet: bool,
}

/// Paper-trading venue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    #[serde(default = "default_starting_balance")]
    pub starting_balance: Decimal,
}

/// Execution tuning shared by every backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Freshness window for balance/position snapshots.
    #[serde(default = "default_snapshot_ttl_secs")]
    pub snapshot_ttl_secs: u64,
    /// Pause after each successful intent, to avoid bursting the venue.
    #[serde(default = "default_action_pause_secs")]
    pub action_pause_secs: u64,
    /// Venue-side cooldown honored after an actual leverage change.
    #[serde(default = "default_leverage_cooldown_secs")]
    pub leverage_cooldown_secs: u64,
    /// Venue-side cooldown honored after a margin-type change.
    #[serde(default = "default_margin_type_cooldown_secs")]
    pub margin_type_cooldown_secs: u64,
    /// Server-side tolerance for request timestamp staleness (wallet-signed
    /// venue), in milliseconds.
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,
}

fn default_exchange() -> String {
    "binance".to_string()
}

fn default_starting_balance() -> Decimal {
    Decimal::new(10_000, 0)
}

fn default_snapshot_ttl_secs() -> u64 {
    15
}

fn default_action_pause_secs() -> u64 {
    1
}

fn default_leverage_cooldown_secs() -> u64 {
    5
}

fn default_margin_type_cooldown_secs() -> u64 {
    3
}

fn default_recv_window_ms() -> u64 {
    50_000
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            starting_balance: default_starting_balance(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl_secs: default_snapshot_ttl_secs(),
            action_pause_secs: default_action_pause_secs(),
            leverage_cooldown_secs: default_leverage_cooldown_secs(),
            margin_type_cooldown_secs: default_margin_type_cooldown_secs(),
            recv_window_ms: default_recv_window_ms(),
        }
    }
}

impl ExecutionConfig {
    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }

    pub fn action_pause(&self) -> Duration {
        Duration::from_secs(self.action_pause_secs)
    }

    pub fn leverage_cooldown(&self) -> Duration {
        Duration::from_secs(self.leverage_cooldown_secs)
    }

    pub fn margin_type_cooldown(&self) -> Duration {
        Duration::from_secs(self.margin_type_cooldown_secs)
    }
}

impl Config {
    /// Load configuration from config files and environment variables.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .prefix("GATEWAY"),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate that the selected venue has the credentials it needs.
    pub fn validate(&self) -> Result<()> {
        match self.exchange.as_str() {
            "binance" => {
                anyhow::ensure!(
                    !self.binance.api_key.is_empty() && !self.binance.secret_key.is_empty(),
                    "binance venue requires api_key and secret_key"
                );
            }
            "aster" => {
                anyhow::ensure!(
                    !self.aster.user_address.is_empty()
                        && !self.aster.signer_address.is_empty()
                        && !self.aster.private_key.is_empty(),
                    "aster venue requires user_address, signer_address and private_key"
                );
            }
            "hyperliquid" => {
                anyhow::ensure!(
                    !self.hyperliquid.private_key.is_empty()
                        && !self.hyperliquid.wallet_address.is_empty(),
                    "hyperliquid venue requires private_key and wallet_address"
                );
            }
            "paper" => {
                anyhow::ensure!(
                    self.paper.starting_balance > Decimal::ZERO,
                    "paper venue requires a positive starting_balance"
                );
            }
            other => anyhow::bail!("unsupported exchange: {other}"),
        }

        anyhow::ensure!(
            self.execution.snapshot_ttl_secs > 0,
            "snapshot_ttl_secs must be positive"
        );
        Ok(())
    }
}

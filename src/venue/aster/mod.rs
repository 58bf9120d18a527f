//! Aster backend (EIP-191 wallet-signed REST).

mod client;
mod signer;
mod trader;
mod types;

pub use client::AsterClient;
pub use signer::{canonical_json, AsterSigner};
pub use trader::AsterTrader;

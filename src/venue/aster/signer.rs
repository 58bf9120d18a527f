//! EIP-191 request signing for the Aster API.
//!
//! Aster authenticates REST calls with an Ethereum wallet signature instead
//! of an API secret. The unsigned parameters are canonicalized to a
//! deterministic JSON string, ABI-encoded together with the account
//! addresses and a nonce, keccak-256 hashed, wrapped in the EIP-191 personal
//! message prefix and signed with the API wallet's secp256k1 key.
//!
//! The nonce is a microsecond timestamp forced to be strictly increasing per
//! signer instance; the venue rejects replayed or reordered nonces, so a
//! retry must never reuse one.

use crate::error::{GatewayError, Result};
use alloy::primitives::{eip191_hash_message, keccak256, Address, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use alloy::sol_types::SolValue;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct AsterSigner {
    user: Address,
    signer: Address,
    wallet: PrivateKeySigner,
    recv_window_ms: u64,
    last_nonce: AtomicU64,
}

impl AsterSigner {
    /// `user` is the main wallet (login identity), `signer` the API wallet
    /// whose `private_key` signs on its behalf. Bad key material fails here,
    /// at construction.
    pub fn new(
        user: &str,
        signer: &str,
        private_key: &str,
        recv_window_ms: u64,
    ) -> Result<Self> {
        let user: Address = user
            .parse()
            .map_err(|e| GatewayError::Configuration(format!("user address: {e}")))?;
        let signer: Address = signer
            .parse()
            .map_err(|e| GatewayError::Configuration(format!("signer address: {e}")))?;
        let wallet: PrivateKeySigner = private_key
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| GatewayError::Configuration(format!("private key: {e}")))?;

        Ok(Self {
            user,
            signer,
            wallet,
            recv_window_ms,
            last_nonce: AtomicU64::new(0),
        })
    }

    /// Microsecond timestamp, strictly increasing even when two calls land
    /// in the same microsecond.
    pub fn next_nonce(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_micros() as u64;

        let mut last = self.last_nonce.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self.last_nonce.compare_exchange_weak(
                last,
                candidate,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_millis() as u64
    }

    /// Sign `params` in place: injects `recvWindow` and `timestamp`, then
    /// attaches `user`, `signer`, `signature` and `nonce`. Returns the nonce
    /// used. Each call generates a fresh nonce, so calling this again for a
    /// retry produces a new, venue-acceptable request.
    pub fn sign(&self, params: &mut Map<String, Value>) -> Result<u64> {
        params.insert(
            "recvWindow".to_string(),
            Value::String(self.recv_window_ms.to_string()),
        );
        params.insert(
            "timestamp".to_string(),
            Value::String(Self::timestamp_ms().to_string()),
        );

        let nonce = self.next_nonce();
        let payload = canonical_json(&Value::Object(params.clone()));

        // ABI tuple (string payload, address user, address signer, uint256 nonce)
        let encoded = (
            payload,
            self.user,
            self.signer,
            U256::from(nonce),
        )
            .abi_encode_params();
        let payload_hash = keccak256(&encoded);
        let digest = eip191_hash_message(payload_hash);

        let signature = self
            .wallet
            .sign_hash_sync(&digest)
            .map_err(|e| GatewayError::Signing(e.to_string()))?;

        let mut sig_bytes = [0u8; 65];
        sig_bytes[..32].copy_from_slice(&signature.r().to_be_bytes::<32>());
        sig_bytes[32..64].copy_from_slice(&signature.s().to_be_bytes::<32>());
        // Recovery id normalized to Electrum notation (27/28).
        sig_bytes[64] = 27 + signature.v() as u8;

        params.insert("user".to_string(), Value::String(self.user.to_string()));
        params.insert(
            "signer".to_string(),
            Value::String(self.signer.to_string()),
        );
        params.insert(
            "signature".to_string(),
            Value::String(format!("0x{}", hex::encode(sig_bytes))),
        );
        params.insert("nonce".to_string(), Value::Number(nonce.into()));

        Ok(nonce)
    }
}

/// Deterministic compact JSON: object keys sorted recursively, every scalar
/// rendered as a string. The venue signs and verifies this exact byte
/// sequence, so the encoding must not depend on map iteration order.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                push_json_string(key, out);
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::String(s) => push_json_string(s, out),
        Value::Number(n) => push_json_string(&n.to_string(), out),
        Value::Bool(b) => push_json_string(if *b { "true" } else { "false" }, out),
        Value::Null => push_json_string("", out),
    }
}

fn push_json_string(s: &str, out: &mut String) {
    match serde_json::to_string(s) {
        Ok(quoted) => out.push_str(&quoted),
        // A bare string cannot fail to serialize; keep the payload well formed.
        Err(_) => out.push_str("\"\""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Well-known test vector key (first Hardhat/Anvil account). Never fund it.
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_USER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
    const TEST_SIGNER: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

    fn test_signer() -> AsterSigner {
        AsterSigner::new(TEST_USER, TEST_SIGNER, TEST_KEY, 50_000).unwrap()
    }

    #[test]
    fn bad_key_material_fails_at_construction() {
        assert!(matches!(
            AsterSigner::new("not-an-address", TEST_SIGNER, TEST_KEY, 50_000),
            Err(GatewayError::Configuration(_))
        ));
        assert!(matches!(
            AsterSigner::new(TEST_USER, TEST_SIGNER, "0xzz", 50_000),
            Err(GatewayError::Configuration(_))
        ));
    }

    #[test]
    fn nonces_are_strictly_increasing() {
        let signer = test_signer();
        let mut last = 0u64;
        for _ in 0..1_000 {
            let nonce = signer.next_nonce();
            assert!(nonce > last, "nonce {nonce} not greater than {last}");
            last = nonce;
        }
    }

    #[test]
    fn consecutive_sign_calls_use_increasing_nonces() {
        let signer = test_signer();
        let mut first = Map::new();
        first.insert("symbol".to_string(), json!("BTCUSDT"));
        let mut second = first.clone();

        let n1 = signer.sign(&mut first).unwrap();
        let n2 = signer.sign(&mut second).unwrap();
        assert!(n2 > n1);
        assert_eq!(first["nonce"].as_u64(), Some(n1));
        assert_eq!(second["nonce"].as_u64(), Some(n2));
    }

    #[test]
    fn sign_attaches_wallet_fields_and_65_byte_signature() {
        let signer = test_signer();
        let mut params = Map::new();
        params.insert("symbol".to_string(), json!("ETHUSDT"));
        params.insert("leverage".to_string(), json!(10));

        signer.sign(&mut params).unwrap();

        assert_eq!(params["user"].as_str(), Some(TEST_USER));
        assert_eq!(params["signer"].as_str(), Some(TEST_SIGNER));
        assert_eq!(params["recvWindow"].as_str(), Some("50000"));
        assert!(params["timestamp"].as_str().is_some());

        let signature = params["signature"].as_str().unwrap();
        assert!(signature.starts_with("0x"));
        let bytes = hex::decode(&signature[2..]).unwrap();
        assert_eq!(bytes.len(), 65);
        assert!(bytes[64] == 27 || bytes[64] == 28);
    }

    #[test]
    fn canonical_json_sorts_keys_and_stringifies_scalars() {
        let value = json!({
            "symbol": "BTCUSDT",
            "leverage": 10,
            "reduceOnly": true,
            "price": "30000.5"
        });
        assert_eq!(
            canonical_json(&value),
            r#"{"leverage":"10","price":"30000.5","reduceOnly":"true","symbol":"BTCUSDT"}"#
        );
    }

    #[test]
    fn canonical_json_recurses_into_nested_structures() {
        let value = json!({
            "b": {"z": 1, "a": false},
            "a": [1, "two", {"k": 3}]
        });
        assert_eq!(
            canonical_json(&value),
            r#"{"a":["1","two",{"k":"3"}],"b":{"a":"false","z":"1"}}"#
        );
    }
}

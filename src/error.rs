//! Gateway error taxonomy.
//!
//! Every fallible operation in the gateway returns [`GatewayError`]. The
//! variants encode the retry policy: [`GatewayError::Transport`] is the only
//! failure that was worth retrying (and has already been retried by the time
//! it surfaces), while a [`GatewayError::VenueRejection`] carries a real HTTP
//! response and must never be replayed, since the order may have executed.

use crate::venue::types::PositionSide;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Bad key material or venue selection; fatal at construction.
    #[error("invalid gateway configuration: {0}")]
    Configuration(String),

    /// No precision metadata for the symbol after an exchange-info fetch.
    /// Fatal for the triggering action only.
    #[error("no precision metadata for symbol {0}")]
    SymbolNotFound(String),

    /// Expected condition: the requested position does not exist.
    #[error("no open {side} position for {symbol}")]
    PositionNotFound { symbol: String, side: PositionSide },

    /// Expected condition: no position at all for the symbol (any side).
    #[error("no open position for {0}")]
    NoPositionForSymbol(String),

    /// Expected condition: opening into an existing same-side position.
    #[error("{symbol} already has an open {side} position; close it first")]
    PositionConflict { symbol: String, side: PositionSide },

    /// The decision engine handed over an intent the gateway cannot act on.
    #[error("invalid trade intent: {0}")]
    InvalidIntent(String),

    /// Request signing failed. Never retried.
    #[error("request signing failed: {0}")]
    Signing(String),

    /// The venue answered with a 4xx/5xx status and a body. Surfaced
    /// immediately; orders are not idempotent, so this is never retried.
    #[error("venue rejected request (HTTP {status}): {body}")]
    VenueRejection { status: u16, body: String },

    /// Transport-level failure (timeout, connect, reset/EOF) that survived
    /// the full retry budget.
    #[error("transport failure after {attempts} attempts: {last}")]
    Transport { attempts: u32, last: String },

    /// Vendor SDK failure that maps to neither a rejection nor a transport
    /// error.
    #[error("venue SDK error: {0}")]
    Sdk(String),

    /// Response did not match the expected schema, or a numeric value was
    /// not representable.
    #[error("malformed venue response: {0}")]
    Parse(String),
}

impl GatewayError {
    /// Classify a reqwest failure: anything without an HTTP status is a
    /// transport-level problem (timeout, refused connection, reset or EOF
    /// mid-body) and may be retried with a fresh signature.
    pub fn is_transient(err: &reqwest::Error) -> bool {
        err.status().is_none() && (err.is_timeout() || err.is_connect() || err.is_request() || err.is_body())
    }
}

impl From<hyperliquid_rust_sdk::Error> for GatewayError {
    fn from(err: hyperliquid_rust_sdk::Error) -> Self {
        use hyperliquid_rust_sdk::Error as SdkError;
        match err {
            SdkError::ClientRequest {
                status_code,
                error_message,
                ..
            } => GatewayError::VenueRejection {
                status: status_code,
                body: error_message,
            },
            SdkError::ServerRequest {
                status_code,
                error_message,
            } => GatewayError::VenueRejection {
                status: status_code,
                body: error_message,
            },
            SdkError::JsonParse(msg) | SdkError::GenericParse(msg) => GatewayError::Parse(msg),
            SdkError::SignatureFailure(msg) | SdkError::PrivateKeyParse(msg) => {
                GatewayError::Signing(msg)
            }
            other => GatewayError::Sdk(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venue_rejection_display_names_status() {
        let err = GatewayError::VenueRejection {
            status: 400,
            body: "{\"code\":-1111,\"msg\":\"Precision is over the maximum\"}".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("HTTP 400"));
        assert!(text.contains("-1111"));
    }

    #[test]
    fn transport_display_names_attempts() {
        let err = GatewayError::Transport {
            attempts: 3,
            last: "connection reset by peer".to_string(),
        };
        assert!(err.to_string().contains("after 3 attempts"));
    }
}

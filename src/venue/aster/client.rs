//! Aster REST transport with bounded retry and per-attempt re-signing.
//!
//! Orders are not idempotent: a request the venue received but we never saw
//! the answer to may still execute. The retry policy therefore only replays
//! failures where no HTTP response existed at all (timeout, refused
//! connection, reset/EOF mid-body). Every attempt is signed from scratch:
//! the short recvWindow invalidates a stale timestamp, and the venue rejects
//! a reused nonce outright.

use crate::config::AsterConfig;
use crate::error::{GatewayError, Result};
use crate::venue::aster::signer::AsterSigner;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::warn;

const BASE_URL: &str = "https://fapi.asterdex.com";

/// Attempts per logical call, including the first.
const MAX_ATTEMPTS: u32 = 3;

/// Linear backoff unit: attempt N sleeps N times this long.
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

pub struct AsterClient {
    http: Client,
    base_url: String,
    signer: AsterSigner,
    retry_backoff: Duration,
}

impl AsterClient {
    pub fn new(config: &AsterConfig, recv_window_ms: u64) -> Result<Self> {
        Self::with_base_url(config, recv_window_ms, BASE_URL)
    }

    pub fn with_base_url(
        config: &AsterConfig,
        recv_window_ms: u64,
        base_url: &str,
    ) -> Result<Self> {
        let signer = AsterSigner::new(
            &config.user_address,
            &config.signer_address,
            &config.private_key,
            recv_window_ms,
        )?;
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::Configuration(format!("http client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            signer,
            retry_backoff: RETRY_BACKOFF,
        })
    }

    /// Shrink the retry backoff. Test hook.
    #[cfg(test)]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Render a parameter value the way it appears on the wire.
    fn param_text(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Signed call with bounded retry. Signing failures are fatal and never
    /// retried; an HTTP response of any status settles the call.
    pub async fn signed_request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        params: Map<String, Value>,
    ) -> Result<T> {
        let mut last_error = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            let mut attempt_params = params.clone();
            self.signer.sign(&mut attempt_params)?;

            match self.dispatch(method.clone(), endpoint, &attempt_params).await {
                Ok((status, body)) => {
                    if !status.is_success() {
                        return Err(GatewayError::VenueRejection {
                            status: status.as_u16(),
                            body,
                        });
                    }
                    return serde_json::from_str(&body)
                        .map_err(|e| GatewayError::Parse(format!("{e}: {body}")));
                }
                Err(err) if GatewayError::is_transient(&err) && attempt < MAX_ATTEMPTS => {
                    let wait = self.retry_backoff * attempt;
                    warn!(
                        endpoint,
                        attempt,
                        max_attempts = MAX_ATTEMPTS,
                        backoff_ms = wait.as_millis() as u64,
                        error = %err,
                        "transient transport failure, re-signing and retrying"
                    );
                    last_error = err.to_string();
                    tokio::time::sleep(wait).await;
                }
                Err(err) => {
                    return Err(GatewayError::Transport {
                        attempts: attempt,
                        last: err.to_string(),
                    });
                }
            }
        }
        Err(GatewayError::Transport {
            attempts: MAX_ATTEMPTS,
            last: last_error,
        })
    }

    /// Unsigned public endpoint (prices, exchange metadata).
    pub async fn public_get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: Option<&str>,
    ) -> Result<T> {
        let url = match query {
            Some(q) => format!("{}{}?{}", self.base_url, endpoint, q),
            None => format!("{}{}", self.base_url, endpoint),
        };
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| GatewayError::Transport {
                attempts: 1,
                last: e.to_string(),
            })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| GatewayError::Transport {
            attempts: 1,
            last: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(GatewayError::VenueRejection {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| GatewayError::Parse(format!("{e}: {body}")))
    }

    /// POST carries the parameters as a form body; GET/DELETE as the query
    /// string.
    async fn dispatch(
        &self,
        method: Method,
        endpoint: &str,
        params: &Map<String, Value>,
    ) -> std::result::Result<(reqwest::StatusCode, String), reqwest::Error> {
        let url = format!("{}{}", self.base_url, endpoint);
        let pairs: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.clone(), Self::param_text(v)))
            .collect();

        let request = if method == Method::POST {
            self.http.post(&url).form(&pairs)
        } else {
            self.http.request(method, &url).query(&pairs)
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn test_config() -> AsterConfig {
        AsterConfig {
            user_address: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".to_string(),
            signer_address: "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".to_string(),
            private_key: TEST_KEY.to_string(),
        }
    }

    #[tokio::test]
    async fn post_sends_signed_form_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fapi/v3/leverage"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"symbol":"BTCUSDT","leverage":10}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = AsterClient::with_base_url(&test_config(), 50_000, &server.uri()).unwrap();
        let mut params = Map::new();
        params.insert("symbol".to_string(), json!("BTCUSDT"));
        params.insert("leverage".to_string(), json!(10));
        let _: Value = client
            .signed_request(Method::POST, "/fapi/v3/leverage", params)
            .await
            .unwrap();

        let request = &server.received_requests().await.unwrap()[0];
        let body = String::from_utf8(request.body.clone()).unwrap();
        assert!(body.contains("signature=0x"));
        assert!(body.contains("nonce="));
        assert!(body.contains("recvWindow=50000"));
        assert!(body.contains("symbol=BTCUSDT"));
        assert_eq!(
            request.headers.get("content-type").unwrap(),
            "application/x-www-form-urlencoded"
        );
    }

    #[tokio::test]
    async fn rejection_with_body_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fapi/v3/order"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                r#"{"code":-2019,"msg":"Margin is insufficient."}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = AsterClient::with_base_url(&test_config(), 50_000, &server.uri())
            .unwrap()
            .with_retry_backoff(Duration::from_millis(1));
        let err = client
            .signed_request::<Value>(Method::POST, "/fapi/v3/order", Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::VenueRejection { status: 400, .. }));
    }

    #[tokio::test]
    async fn connection_failures_exhaust_all_attempts() {
        // Nothing listens on this port: every attempt is refused.
        let config = test_config();
        let client = AsterClient::with_base_url(&config, 50_000, "http://127.0.0.1:9")
            .unwrap()
            .with_retry_backoff(Duration::from_millis(1));

        let err = client
            .signed_request::<Value>(Method::GET, "/fapi/v3/balance", Map::new())
            .await
            .unwrap_err();
        match err {
            GatewayError::Transport { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn each_attempt_is_signed_with_a_fresh_nonce() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fapi/v3/order"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(2)
            .mount(&server)
            .await;

        let client = AsterClient::with_base_url(&test_config(), 50_000, &server.uri()).unwrap();
        let mut params = Map::new();
        params.insert("symbol".to_string(), json!("BTCUSDT"));
        let _: Value = client
            .signed_request(Method::POST, "/fapi/v3/order", params.clone())
            .await
            .unwrap();
        let _: Value = client
            .signed_request(Method::POST, "/fapi/v3/order", params)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let nonce_of = |body: &[u8]| -> u64 {
            let text = String::from_utf8(body.to_vec()).unwrap();
            text.split('&')
                .find_map(|pair| pair.strip_prefix("nonce="))
                .unwrap()
                .parse()
                .unwrap()
        };
        let first = nonce_of(&requests[0].body);
        let second = nonce_of(&requests[1].body);
        assert!(second > first, "nonce {second} did not advance past {first}");
    }
}

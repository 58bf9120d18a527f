//! Binance USDT-M futures REST client.
//!
//! Authenticated calls are signed with HMAC-SHA256 over the query string and
//! sent with the `X-MBX-APIKEY` header. Every outbound call runs through a
//! bounded retry loop that regenerates the timestamp and signature per
//! attempt; only transport-level failures retry, because an HTTP response of
//! any status means the venue may already have acted on the request.

use crate::config::BinanceConfig;
use crate::error::{GatewayError, Result};
use crate::venue::binance::types::*;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const FUTURES_BASE_URL: &str = "https://fapi.binance.com";
const FUTURES_TESTNET_URL: &str = "https://testnet.binancefuture.com";

/// Attempts per logical call, including the first.
const MAX_ATTEMPTS: u32 = 3;

/// Linear backoff unit: attempt N sleeps N times this long.
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Signed REST client for one Binance futures account.
pub struct BinanceFuturesClient {
    http: Client,
    api_key: String,
    secret_key: String,
    base_url: String,
    retry_backoff: Duration,
}

impl BinanceFuturesClient {
    pub fn new(config: &BinanceConfig) -> Result<Self> {
        let base_url = if config.testnet {
            FUTURES_TESTNET_URL
        } else {
            FUTURES_BASE_URL
        };
        Self::with_base_url(config, base_url)
    }

    /// Construct against an explicit base URL (testnet, local mock).
    pub fn with_base_url(config: &BinanceConfig, base_url: &str) -> Result<Self> {
        if config.api_key.is_empty() || config.secret_key.is_empty() {
            return Err(GatewayError::Configuration(
                "binance api_key and secret_key must be set".to_string(),
            ));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::Configuration(format!("http client: {e}")))?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_backoff: RETRY_BACKOFF,
        })
    }

    /// Shrink the retry backoff. Test hook.
    #[cfg(test)]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// HMAC-SHA256 signature over the query string, hex-encoded.
    fn sign(&self, query_string: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(query_string.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_millis() as u64
    }

    fn encode_params(params: &[(String, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Unsigned public endpoint.
    async fn public_get<T: DeserializeOwned>(&self, path: &str, query: Option<&str>) -> Result<T> {
        let url = match query {
            Some(q) => format!("{}{}?{}", self.base_url, path, q),
            None => format!("{}{}", self.base_url, path),
        };
        self.execute_with_retry(|| self.http.get(&url)).await
    }

    /// Authenticated endpoint. The timestamp and signature are regenerated
    /// on every attempt so a retry never replays a stale-signed request.
    async fn signed_request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: Vec<(String, String)>,
    ) -> Result<T> {
        self.execute_with_retry(|| {
            let mut attempt_params = params.clone();
            attempt_params.push(("timestamp".to_string(), Self::timestamp().to_string()));
            let query = Self::encode_params(&attempt_params);
            let signature = self.sign(&query);
            let url = format!(
                "{}{}?{}&signature={}",
                self.base_url, path, query, signature
            );
            self.http
                .request(method.clone(), &url)
                .header("X-MBX-APIKEY", &self.api_key)
        })
        .await
    }

    /// Bounded-retry execution. `build` produces a fresh request per attempt.
    /// A response with any HTTP status settles the call immediately: success
    /// parses, failure surfaces as a venue rejection that is never replayed.
    async fn execute_with_retry<T, F>(&self, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_error = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .map_err(|e| GatewayError::Transport {
                            attempts: attempt,
                            last: e.to_string(),
                        })?;
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
                        attempt,
                        max_attempts = MAX_ATTEMPTS,
                        backoff_ms = wait.as_millis() as u64,
                        error = %err,
                        "transient transport failure, retrying with fresh signature"
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

    // ==================== Market Data (Public) ====================

    pub async fn exchange_info(&self) -> Result<FuturesExchangeInfo> {
        self.public_get("/fapi/v1/exchangeInfo", None).await
    }

    pub async fn ticker_price(&self, symbol: &str) -> Result<TickerPrice> {
        let query = format!("symbol={symbol}");
        self.public_get("/fapi/v1/ticker/price", Some(&query)).await
    }

    // ==================== Account (Authenticated) ====================

    pub async fn account(&self) -> Result<FuturesAccount> {
        self.signed_request(Method::GET, "/fapi/v2/account", Vec::new())
            .await
    }

    pub async fn position_risk(&self) -> Result<Vec<PositionRisk>> {
        self.signed_request(Method::GET, "/fapi/v2/positionRisk", Vec::new())
            .await
    }

    // ==================== Orders (Authenticated) ====================

    pub async fn place_order(&self, params: Vec<(String, String)>) -> Result<OrderResponse> {
        debug!(?params, "placing futures order");
        self.signed_request(Method::POST, "/fapi/v1/order", params)
            .await
    }

    pub async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<OrderResponse> {
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("orderId".to_string(), order_id.to_string()),
        ];
        self.signed_request(Method::DELETE, "/fapi/v1/order", params)
            .await
    }

    pub async fn cancel_all_orders(&self, symbol: &str) -> Result<()> {
        let params = vec![("symbol".to_string(), symbol.to_string())];
        let _: serde_json::Value = self
            .signed_request(Method::DELETE, "/fapi/v1/allOpenOrders", params)
            .await?;
        Ok(())
    }

    pub async fn open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>> {
        let params = vec![("symbol".to_string(), symbol.to_string())];
        self.signed_request(Method::GET, "/fapi/v1/openOrders", params)
            .await
    }

    pub async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("leverage".to_string(), leverage.to_string()),
        ];
        let _: serde_json::Value = self
            .signed_request(Method::POST, "/fapi/v1/leverage", params)
            .await?;
        Ok(())
    }

    pub async fn set_margin_type(&self, symbol: &str, margin_type: &str) -> Result<()> {
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("marginType".to_string(), margin_type.to_string()),
        ];
        let _: serde_json::Value = self
            .signed_request(Method::POST, "/fapi/v1/marginType", params)
            .await?;
        Ok(())
    }

    pub async fn all_orders(
        &self,
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: usize,
    ) -> Result<Vec<HistoricalOrder>> {
        let mut params = vec![("limit".to_string(), limit.to_string())];
        if let Some(start) = start_time {
            params.push(("startTime".to_string(), start.to_string()));
        }
        if let Some(end) = end_time {
            params.push(("endTime".to_string(), end.to_string()));
        }
        self.signed_request(Method::GET, "/fapi/v1/allOrders", params)
            .await
    }
}

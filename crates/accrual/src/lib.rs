//! HTTP client for the external accrual authority.
//!
//! The authority answers `GET {base}/api/orders/{number}` with:
//!
//! - `200` and a JSON body `{"order", "status", "accrual"?}`
//! - `204` when the order is not registered
//! - `429` with an optional `Retry-After` (seconds) when rate limiting
//! - `500` when it cannot answer
//!
//! [`Client`] maps these onto [`engine::AccrualReply`].

use std::time::Duration;

use async_trait::async_trait;
use engine::{AccrualError, AccrualReply, AccrualSource};
use reqwest::{StatusCode, Url, header::RETRY_AFTER};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid accrual address: {0}")]
    InvalidAddress(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Body of a successful order lookup.
#[derive(Debug, Deserialize)]
struct OrderResponse {
    order: String,
    status: String,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    accrual: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct Client {
    base_url: Url,
    http: reqwest::Client,
}

impl Client {
    /// `address` may omit the scheme (`localhost:8080`), plain `http` is
    /// assumed then. Every request is bounded by `timeout`.
    pub fn new(address: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base_url = parse_base_url(address)?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, number: &str) -> Result<Url, AccrualError> {
        self.base_url
            .join(&format!("api/orders/{number}"))
            .map_err(|err| AccrualError::Transport(format!("invalid order url: {err}")))
    }
}

fn parse_base_url(address: &str) -> Result<Url, ClientError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(ClientError::InvalidAddress("empty address".to_string()));
    }
    let mut raw = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    };
    // `Url::join` replaces the last path segment unless it ends with '/'.
    if !raw.ends_with('/') {
        raw.push('/');
    }
    let url = Url::parse(&raw).map_err(|err| ClientError::InvalidAddress(format!("{raw}: {err}")))?;
    if url.cannot_be_a_base() {
        return Err(ClientError::InvalidAddress(raw));
    }
    Ok(url)
}

/// Delay from a `Retry-After` header. Only the delta-seconds form is honored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[async_trait]
impl AccrualSource for Client {
    async fn fetch(&self, number: &str) -> Result<AccrualReply, AccrualError> {
        let endpoint = self.endpoint(number)?;
        let res = self
            .http
            .get(endpoint)
            .send()
            .await
            .map_err(|err| AccrualError::Transport(err.to_string()))?;

        match res.status() {
            StatusCode::OK => {
                let body = res
                    .json::<OrderResponse>()
                    .await
                    .map_err(|err| AccrualError::Decode(err.to_string()))?;
                if body.order != number {
                    tracing::warn!(
                        order = number,
                        reported = %body.order,
                        "accrual authority answered for a different order"
                    );
                }
                Ok(AccrualReply::Status {
                    status: body.status,
                    accrual: body.accrual,
                })
            }
            StatusCode::NO_CONTENT => Ok(AccrualReply::NotRegistered),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = res
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(parse_retry_after);
                Ok(AccrualReply::RateLimited { retry_after })
            }
            status => {
                tracing::debug!(order = number, %status, "unexpected accrual response");
                Ok(AccrualReply::Unavailable)
            }
        }
    }
}

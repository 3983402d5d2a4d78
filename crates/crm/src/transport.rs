//! Thin HTTP seam between the gateway's pacing logic and the wire.
//!
//! The gateway only ever talks to a [`CrmTransport`]; production wiring uses
//! [`HttpTransport`] over a shared `reqwest::Client`, tests substitute scripted
//! implementations.

use async_trait::async_trait;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use thiserror::Error;

const DAILY_LIMIT_HEADER: &str = "X-HubSpot-RateLimit-Daily";
const DAILY_REMAINING_HEADER: &str = "X-HubSpot-RateLimit-Daily-Remaining";

#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self { method: Method::GET, path: path.into(), body: None }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self { method: Method::POST, path: path.into(), body: Some(body) }
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self { method: Method::PATCH, path: path.into(), body: Some(body) }
    }
}

/// Daily-quota snapshot reported by the provider on every response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateQuota {
    pub daily_limit: u64,
    pub daily_remaining: u64,
}

impl RateQuota {
    /// Fraction of the daily quota still available, in `0.0..=1.0`.
    pub fn remaining_ratio(&self) -> f64 {
        if self.daily_limit == 0 {
            return 0.0;
        }
        self.daily_remaining as f64 / self.daily_limit as f64
    }
}

#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
    pub quota: Option<RateQuota>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("crm request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait CrmTransport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    access_token: SecretString,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, base_url: String, access_token: SecretString) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self { client, base_url, access_token }
    }
}

#[async_trait]
impl CrmTransport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .bearer_auth(self.access_token.expose_secret());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let quota = parse_quota(response.headers());
        let bytes = response.bytes().await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        Ok(ApiResponse { status, body, quota })
    }
}

fn parse_quota(headers: &reqwest::header::HeaderMap) -> Option<RateQuota> {
    let daily_limit = header_u64(headers, DAILY_LIMIT_HEADER)?;
    let daily_remaining = header_u64(headers, DAILY_REMAINING_HEADER)?;
    Some(RateQuota { daily_limit, daily_remaining })
}

fn header_u64(headers: &reqwest::header::HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

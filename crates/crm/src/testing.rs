//! Shared test doubles for the crm crate.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::transport::{ApiRequest, ApiResponse, CrmTransport, RateQuota, TransportError};

/// Transport backed by a closure, so each test can script exactly the remote
/// behavior it needs (and record what was sent).
pub(crate) struct FnTransport<F>(pub F);

#[async_trait]
impl<F> CrmTransport for FnTransport<F>
where
    F: Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync,
{
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        (self.0)(request)
    }
}

pub(crate) fn ok(body: Value) -> ApiResponse {
    ApiResponse { status: 200, body, quota: None }
}

pub(crate) fn status(status: u16) -> ApiResponse {
    ApiResponse { status, body: Value::Null, quota: None }
}

pub(crate) fn ok_with_quota(limit: u64, remaining: u64) -> ApiResponse {
    ApiResponse {
        status: 200,
        body: json!({}),
        quota: Some(RateQuota { daily_limit: limit, daily_remaining: remaining }),
    }
}

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use quotelink_crm::Gateway;
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    gateway: Gateway,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub gateway: HealthCheck,
    pub checked_at: String,
}

pub fn router(gateway: Gateway) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { gateway })
}

pub async fn spawn(bind_address: &str, port: u16, gateway: Gateway) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(listen_error) = axum::serve(listener, router(gateway)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %listen_error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let gateway = gateway_check(&state.gateway).await;
    let ready = gateway.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "quotelink-server runtime initialized".to_string(),
        },
        gateway,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn gateway_check(gateway: &Gateway) -> HealthCheck {
    let permits = gateway.available_permits();
    let snapshot = gateway.rate_snapshot().await;

    let quota = match snapshot.quota {
        Some(quota) => {
            format!(", daily quota {}/{}", quota.daily_remaining, quota.daily_limit)
        }
        None => String::new(),
    };
    let detail = format!(
        "{permits} call slots free, min gap {}ms{quota}",
        snapshot.min_gap.as_millis()
    );

    if permits > 0 {
        HealthCheck { status: "ready", detail }
    } else {
        HealthCheck { status: "saturated", detail }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{extract::State, http::StatusCode, Json};
    use quotelink_core::config::GatewayConfig;
    use quotelink_crm::{
        ApiRequest, ApiResponse, CrmTransport, Gateway, RateQuota, TransportError,
    };
    use serde_json::json;

    use crate::health::{health, HealthState};

    struct QuotaTransport;

    #[async_trait]
    impl CrmTransport for QuotaTransport {
        async fn send(&self, _request: &ApiRequest) -> Result<ApiResponse, TransportError> {
            Ok(ApiResponse {
                status: 200,
                body: json!({}),
                quota: Some(RateQuota { daily_limit: 1000, daily_remaining: 900 }),
            })
        }
    }

    fn gateway() -> Gateway {
        Gateway::new(
            Arc::new(QuotaTransport),
            &GatewayConfig { max_concurrency: 4, min_gap_ms: 1, batch_page_size: 100 },
        )
    }

    #[tokio::test]
    async fn health_reports_ready_with_free_gateway_slots() {
        let (status, Json(payload)) = health(State(HealthState { gateway: gateway() })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.service.status, "ready");
        assert!(payload.gateway.detail.contains("4 call slots free"), "{}", payload.gateway.detail);
    }

    #[tokio::test]
    async fn health_reports_the_latest_quota_snapshot() {
        let gateway = gateway();
        gateway.call(ApiRequest::get("/ping")).await.expect("call should succeed");

        let (_, Json(payload)) = health(State(HealthState { gateway })).await;
        assert!(payload.gateway.detail.contains("daily quota 900/1000"), "{}", payload.gateway.detail);
    }
}

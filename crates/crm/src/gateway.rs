//! Rate-governed gateway: the single chokepoint for all CRM calls.
//!
//! Every caller funnels through [`Gateway::call`], which enforces a global
//! minimum gap between dispatches, bounds concurrent in-flight calls with a
//! semaphore, widens its pacing as the provider's daily quota runs down, and
//! retries a throttled call exactly once.

use std::sync::Arc;
use std::time::Duration;

use quotelink_core::config::GatewayConfig;
use quotelink_core::retry::RetryPolicy;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::transport::{ApiRequest, ApiResponse, CrmTransport, RateQuota, TransportError};

/// Pacing tiers derived from the provider's daily-quota headers.
const GAP_MEDIUM: Duration = Duration::from_millis(3500);
const GAP_LONG: Duration = Duration::from_millis(4000);
const QUOTA_CRITICAL_RATIO: f64 = 0.05;
const QUOTA_LOW_RATIO: f64 = 0.20;

/// Computes how long to sleep before retrying a throttled call.
pub type BackoffFn = fn(Option<RateQuota>) -> Duration;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("crm rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },
    #[error("crm request failed with status {status}: {body}")]
    Remote { status: u16, body: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("gateway is shut down")]
    Shutdown,
}

/// Shared pacing state. Mutated by every call; the slot reservation below is
/// the one critical section that keeps concurrent callers honest.
#[derive(Debug)]
struct RateState {
    next_slot: Option<Instant>,
    min_gap: Duration,
    quota: Option<RateQuota>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateSnapshot {
    pub min_gap: Duration,
    pub quota: Option<RateQuota>,
}

#[derive(Clone)]
pub struct Gateway {
    transport: Arc<dyn CrmTransport>,
    semaphore: Arc<Semaphore>,
    state: Arc<Mutex<RateState>>,
    base_gap: Duration,
    retry: RetryPolicy,
    backoff: BackoffFn,
}

impl Gateway {
    pub fn new(transport: Arc<dyn CrmTransport>, config: &GatewayConfig) -> Self {
        Self::with_policy(transport, config, RetryPolicy::default(), throttle_backoff)
    }

    pub fn with_policy(
        transport: Arc<dyn CrmTransport>,
        config: &GatewayConfig,
        retry: RetryPolicy,
        backoff: BackoffFn,
    ) -> Self {
        let base_gap = Duration::from_millis(config.min_gap_ms);
        Self {
            transport,
            semaphore: Arc::new(Semaphore::new(config.max_concurrency)),
            state: Arc::new(Mutex::new(RateState {
                next_slot: None,
                min_gap: base_gap,
                quota: None,
            })),
            base_gap,
            retry,
            backoff,
        }
    }

    /// Issues one CRM call, paced and bounded by the shared rate state.
    ///
    /// A 429 is retried exactly once after a quota-derived backoff; a second
    /// 429 propagates as [`GatewayError::RateLimitExceeded`]. Any other non-2xx
    /// response is surfaced unretried as [`GatewayError::Remote`].
    pub async fn call(&self, request: ApiRequest) -> Result<ApiResponse, GatewayError> {
        let _permit = self.semaphore.acquire().await.map_err(|_| GatewayError::Shutdown)?;

        let mut attempts = 0;
        loop {
            attempts += 1;
            let slot = self.reserve_slot().await;
            tokio::time::sleep_until(slot).await;

            let response = self.transport.send(&request).await?;
            let quota = response.quota;
            self.observe_quota(quota).await;

            if response.status == 429 {
                if self.retry.should_retry(attempts) {
                    let delay = (self.backoff)(quota);
                    warn!(
                        event_name = "crm.gateway.throttled",
                        path = %request.path,
                        attempt = attempts,
                        backoff_ms = delay.as_millis() as u64,
                        "crm throttled the request, backing off before the retry"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(GatewayError::RateLimitExceeded { attempts });
            }

            if !response.is_success() {
                return Err(GatewayError::Remote {
                    status: response.status,
                    body: response.body.to_string(),
                });
            }

            return Ok(response);
        }
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub async fn rate_snapshot(&self) -> RateSnapshot {
        let state = self.state.lock().await;
        RateSnapshot { min_gap: state.min_gap, quota: state.quota }
    }

    /// Reserves the next dispatch slot in one critical section. Checking the
    /// gap and advancing the shared clock must not be separable, or two
    /// concurrent callers could both conclude the gap has elapsed.
    async fn reserve_slot(&self) -> Instant {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let slot = state.next_slot.filter(|next| *next > now).unwrap_or(now);
        state.next_slot = Some(slot + state.min_gap);
        slot
    }

    async fn observe_quota(&self, quota: Option<RateQuota>) {
        let Some(quota) = quota else { return };
        let mut state = self.state.lock().await;
        state.quota = Some(quota);

        let widened = widened_gap(self.base_gap, state.min_gap, quota);
        if widened > state.min_gap {
            debug!(
                event_name = "crm.gateway.gap_widened",
                min_gap_ms = widened.as_millis() as u64,
                daily_remaining = quota.daily_remaining,
                "widening call gap as daily quota runs down"
            );
            state.min_gap = widened;
        }
    }
}

/// The gap only ever widens during a run; it narrows again only through
/// explicit reconfiguration (a process restart).
fn widened_gap(base: Duration, current: Duration, quota: RateQuota) -> Duration {
    let ratio = quota.remaining_ratio();
    let target = if ratio < QUOTA_CRITICAL_RATIO {
        GAP_LONG
    } else if ratio < QUOTA_LOW_RATIO {
        GAP_MEDIUM
    } else {
        base
    };
    current.max(target)
}

/// Default backoff before the single throttle retry, derived from the same
/// quota thresholds as the pacing gap.
pub fn throttle_backoff(quota: Option<RateQuota>) -> Duration {
    match quota {
        Some(quota) if quota.remaining_ratio() < QUOTA_CRITICAL_RATIO => GAP_LONG,
        Some(quota) if quota.remaining_ratio() < QUOTA_LOW_RATIO => GAP_MEDIUM,
        _ => Duration::from_millis(3000),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::future::join_all;
    use quotelink_core::config::GatewayConfig;
    use quotelink_core::retry::RetryPolicy;
    use serde_json::json;

    use super::{throttle_backoff, widened_gap, Gateway, GatewayError};
    use crate::testing::{ok, ok_with_quota, status, FnTransport};
    use crate::transport::{ApiRequest, RateQuota};

    fn test_config(min_gap_ms: u64) -> GatewayConfig {
        GatewayConfig { max_concurrency: 8, min_gap_ms, batch_page_size: 100 }
    }

    fn tiny_backoff(_quota: Option<RateQuota>) -> Duration {
        Duration::from_millis(5)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_calls_never_dispatch_closer_than_the_gap() {
        let dispatched = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorder = Arc::clone(&dispatched);
        let gateway = Gateway::new(
            Arc::new(FnTransport(move |_request: &ApiRequest| {
                recorder.lock().expect("lock").push(std::time::Instant::now());
                Ok(ok(json!({})))
            })),
            &test_config(30),
        );

        join_all((0..4).map(|_| {
            let gateway = gateway.clone();
            async move { gateway.call(ApiRequest::get("/ping")).await }
        }))
        .await
        .into_iter()
        .for_each(|result| {
            result.expect("call should succeed");
        });

        let mut times = dispatched.lock().expect("lock").clone();
        times.sort();
        assert_eq!(times.len(), 4);
        for pair in times.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(gap >= Duration::from_millis(25), "dispatch gap too small: {gap:?}");
        }
    }

    #[tokio::test]
    async fn throttled_call_is_retried_once_and_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let gateway = Gateway::with_policy(
            Arc::new(FnTransport(move |_request: &ApiRequest| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(status(429))
                } else {
                    Ok(ok(json!({"id": "1"})))
                }
            })),
            &test_config(1),
            RetryPolicy::default(),
            tiny_backoff,
        );

        let response = gateway.call(ApiRequest::get("/ping")).await.expect("retry should succeed");
        assert_eq!(response.status, 200);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_throttle_propagates_rate_limit_exceeded() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let gateway = Gateway::with_policy(
            Arc::new(FnTransport(move |_request: &ApiRequest| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(status(429))
            })),
            &test_config(1),
            RetryPolicy::default(),
            tiny_backoff,
        );

        let error = gateway.call(ApiRequest::get("/ping")).await.expect_err("should exhaust");
        assert!(matches!(error, GatewayError::RateLimitExceeded { attempts: 2 }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn remote_errors_are_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let gateway = Gateway::with_policy(
            Arc::new(FnTransport(move |_request: &ApiRequest| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(crate::transport::ApiResponse {
                    status: 500,
                    body: json!({"message": "internal error"}),
                    quota: None,
                })
            })),
            &test_config(1),
            RetryPolicy::default(),
            tiny_backoff,
        );

        let error = gateway.call(ApiRequest::get("/ping")).await.expect_err("should fail");
        match error {
            GatewayError::Remote { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("internal error"));
            }
            other => panic!("expected remote error, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn low_quota_response_widens_the_gap() {
        let gateway = Gateway::with_policy(
            Arc::new(FnTransport(|_request: &ApiRequest| Ok(ok_with_quota(1000, 10)))),
            &test_config(1),
            RetryPolicy::default(),
            tiny_backoff,
        );

        gateway.call(ApiRequest::get("/ping")).await.expect("call should succeed");

        let snapshot = gateway.rate_snapshot().await;
        assert_eq!(snapshot.min_gap, Duration::from_millis(4000));
        assert_eq!(
            snapshot.quota,
            Some(RateQuota { daily_limit: 1000, daily_remaining: 10 })
        );
    }

    #[test]
    fn gap_widens_by_tier_and_never_narrows() {
        let base = Duration::from_millis(3000);
        let critical = RateQuota { daily_limit: 1000, daily_remaining: 10 };
        let low = RateQuota { daily_limit: 1000, daily_remaining: 150 };
        let healthy = RateQuota { daily_limit: 1000, daily_remaining: 900 };

        assert_eq!(widened_gap(base, base, critical), Duration::from_millis(4000));
        assert_eq!(widened_gap(base, base, low), Duration::from_millis(3500));
        assert_eq!(widened_gap(base, base, healthy), base);

        // Once widened, a healthy quota report does not narrow the gap back.
        let widened = Duration::from_millis(4000);
        assert_eq!(widened_gap(base, widened, healthy), widened);
    }

    #[test]
    fn throttle_backoff_tracks_quota_tiers() {
        assert_eq!(throttle_backoff(None), Duration::from_millis(3000));
        assert_eq!(
            throttle_backoff(Some(RateQuota { daily_limit: 1000, daily_remaining: 10 })),
            Duration::from_millis(4000)
        );
        assert_eq!(
            throttle_backoff(Some(RateQuota { daily_limit: 1000, daily_remaining: 150 })),
            Duration::from_millis(3500)
        );
        assert_eq!(
            throttle_backoff(Some(RateQuota { daily_limit: 1000, daily_remaining: 999 })),
            Duration::from_millis(3000)
        );
    }
}

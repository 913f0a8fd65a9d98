//! Circuit breaker: per `(tenantId, routeId, upstreamUrl)`
//! triple, CLOSED/OPEN/HALF_OPEN state persisted as JSON in the shared
//! cache so all gateway processes observe the same breaker.

use super::url_hash8;
use crate::cache::CacheClient;
use crate::metrics::MetricsRegistry;
use crate::models::CircuitBreakerConfig;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    /// `{CLOSED→0, OPEN→1, HALF_OPEN→2}`, the metrics-surface encoding.
    pub fn as_gauge_value(&self) -> f64 {
        match self {
            BreakerState::Closed => 0.0,
            BreakerState::Open => 1.0,
            BreakerState::HalfOpen => 2.0,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            BreakerState::Closed => "CLOSED",
            BreakerState::Open => "OPEN",
            BreakerState::HalfOpen => "HALF_OPEN",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BreakerStatus {
    state: BreakerState,
    failures: u32,
    successes: u32,
    last_failure_time: Option<i64>,
    last_state_change: i64,
}

impl BreakerStatus {
    fn initial(now_ms: i64) -> Self {
        Self {
            state: BreakerState::Closed,
            failures: 0,
            successes: 0,
            last_failure_time: None,
            last_state_change: now_ms,
        }
    }
}

pub struct CircuitBreaker {
    cache: Arc<dyn CacheClient>,
    metrics: Arc<MetricsRegistry>,
}

impl CircuitBreaker {
    pub fn new(cache: Arc<dyn CacheClient>, metrics: Arc<MetricsRegistry>) -> Self {
        Self { cache, metrics }
    }

    fn key(tenant_id: &str, route_id: &str, upstream_url: &str) -> String {
        format!("cb:{tenant_id}:{route_id}:{}", url_hash8(upstream_url))
    }

    fn record_transition(&self, tenant_id: &str, route_id: &str, upstream_url: &str, from: BreakerState, to: BreakerState) {
        self.metrics
            .record_circuit_breaker_transition(tenant_id, route_id, upstream_url, from.label(), to.label());
    }

    async fn load(&self, key: &str, now_ms: i64) -> BreakerStatus {
        match self.cache.get(key).await {
            Ok(Some(raw)) => {
                serde_json::from_str(&raw).unwrap_or_else(|_| BreakerStatus::initial(now_ms))
            }
            Ok(None) => BreakerStatus::initial(now_ms),
            Err(e) => {
                warn!("circuit breaker cache read failed, treating as fresh: {e}");
                BreakerStatus::initial(now_ms)
            }
        }
    }

    async fn save(&self, key: &str, status: &BreakerStatus, timeout_ms: u64) {
        let ttl_secs = timeout_ms / 1000 + 60;
        match serde_json::to_string(status) {
            Ok(json) => {
                if let Err(e) = self.cache.setex(key, ttl_secs, &json).await {
                    warn!("circuit breaker cache write failed: {e}");
                }
            }
            Err(e) => warn!("circuit breaker status serialization failed: {e}"),
        }
    }

    /// Current state for the metrics gauge, without mutating anything (a
    /// stale OPEN past its timeout is reported as OPEN here; [`Self::can_execute`]
    /// is what actually performs the OPEN→HALF_OPEN transition).
    pub async fn current_state(&self, tenant_id: &str, route_id: &str, upstream_url: &str, now_ms: i64) -> BreakerState {
        let key = Self::key(tenant_id, route_id, upstream_url);
        self.load(&key, now_ms).await.state
    }

    /// Fail-open on cache errors: a broken cache must never itself take the
    /// gateway down, so unreadable state is treated as CLOSED.
    pub async fn can_execute(
        &self,
        tenant_id: &str,
        route_id: &str,
        upstream_url: &str,
        config: &CircuitBreakerConfig,
        now_ms: i64,
    ) -> bool {
        let key = Self::key(tenant_id, route_id, upstream_url);
        let mut status = self.load(&key, now_ms).await;

        match status.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => true,
            BreakerState::Open => {
                if now_ms - status.last_state_change >= config.timeout_ms as i64 {
                    debug!("breaker {key} timeout elapsed, transitioning to HALF_OPEN");
                    status.state = BreakerState::HalfOpen;
                    status.successes = 0;
                    status.last_state_change = now_ms;
                    self.save(&key, &status, config.timeout_ms).await;
                    self.record_transition(tenant_id, route_id, upstream_url, BreakerState::Open, BreakerState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub async fn record_success(
        &self,
        tenant_id: &str,
        route_id: &str,
        upstream_url: &str,
        config: &CircuitBreakerConfig,
        now_ms: i64,
    ) {
        let key = Self::key(tenant_id, route_id, upstream_url);
        let mut status = self.load(&key, now_ms).await;

        match status.state {
            BreakerState::HalfOpen => {
                status.successes += 1;
                let reached_threshold = status.successes >= config.success_threshold;
                if reached_threshold {
                    debug!("breaker {key} reached success threshold, transitioning to CLOSED");
                    status.state = BreakerState::Closed;
                    status.failures = 0;
                    status.successes = 0;
                    status.last_state_change = now_ms;
                }
                self.save(&key, &status, config.timeout_ms).await;
                if reached_threshold {
                    self.record_transition(tenant_id, route_id, upstream_url, BreakerState::HalfOpen, BreakerState::Closed);
                }
            }
            BreakerState::Closed if status.failures > 0 => {
                status.failures = 0;
                self.save(&key, &status, config.timeout_ms).await;
            }
            BreakerState::Closed | BreakerState::Open => {}
        }
    }

    pub async fn record_failure(
        &self,
        tenant_id: &str,
        route_id: &str,
        upstream_url: &str,
        config: &CircuitBreakerConfig,
        now_ms: i64,
    ) {
        let key = Self::key(tenant_id, route_id, upstream_url);
        let mut status = self.load(&key, now_ms).await;

        match status.state {
            BreakerState::Closed => {
                status.failures += 1;
                let tripped = status.failures >= config.failure_threshold;
                if tripped {
                    debug!("breaker {key} reached failure threshold, transitioning to OPEN");
                    status.state = BreakerState::Open;
                    status.last_failure_time = Some(now_ms);
                    status.last_state_change = now_ms;
                }
                self.save(&key, &status, config.timeout_ms).await;
                if tripped {
                    self.record_transition(tenant_id, route_id, upstream_url, BreakerState::Closed, BreakerState::Open);
                }
            }
            BreakerState::HalfOpen => {
                debug!("breaker {key} failed in HALF_OPEN, transitioning back to OPEN");
                status.state = BreakerState::Open;
                status.last_failure_time = Some(now_ms);
                status.last_state_change = now_ms;
                self.save(&key, &status, config.timeout_ms).await;
                self.record_transition(tenant_id, route_id, upstream_url, BreakerState::HalfOpen, BreakerState::Open);
            }
            BreakerState::Open => {}
        }
    }
}

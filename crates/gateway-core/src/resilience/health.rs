//! Active health checking: one background prober per registered
//! `(tenantId, routeId, upstreamUrl)` triple, de-duplicated, sharing its
//! verdict through the shared cache so the proxy orchestrator never blocks
//! on a live probe.

use super::url_hash8;
use crate::cache::CacheClient;
use crate::models::HealthCheckConfig;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    pub last_check_time: Option<i64>,
    pub last_success_time: Option<i64>,
    pub last_failure_time: Option<i64>,
}

impl Default for HealthStatus {
    /// Optimistic: healthy until a threshold of consecutive failures is crossed.
    fn default() -> Self {
        Self {
            healthy: true,
            consecutive_successes: 0,
            consecutive_failures: 0,
            last_check_time: None,
            last_success_time: None,
            last_failure_time: None,
        }
    }
}

pub struct HealthChecker {
    cache: Arc<dyn CacheClient>,
    http: reqwest::Client,
    registered: Mutex<HashSet<String>>,
    shutdown: watch::Sender<bool>,
}

impl HealthChecker {
    pub fn new(cache: Arc<dyn CacheClient>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            cache,
            http: reqwest::Client::new(),
            registered: Mutex::new(HashSet::new()),
            shutdown,
        }
    }

    fn status_key(tenant_id: &str, route_id: &str, upstream_url: &str) -> String {
        format!("health:{tenant_id}:{route_id}:{}", url_hash8(upstream_url))
    }

    pub async fn status(
        &self,
        tenant_id: &str,
        route_id: &str,
        upstream_url: &str,
    ) -> HealthStatus {
        let key = Self::status_key(tenant_id, route_id, upstream_url);
        self.load(&key).await
    }

    async fn load(&self, key: &str) -> HealthStatus {
        match self.cache.get(key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
            Ok(None) => HealthStatus::default(),
            Err(e) => {
                warn!("health cache read failed, assuming optimistic default: {e}");
                HealthStatus::default()
            }
        }
    }

    async fn save(&self, key: &str, status: &HealthStatus, interval_ms: u64) {
        let ttl_secs = (interval_ms.saturating_mul(3) / 1000).max(1);
        if let Ok(json) = serde_json::to_string(status) {
            if let Err(e) = self.cache.setex(key, ttl_secs, &json).await {
                warn!("health cache write failed: {e}");
            }
        }
    }

    /// Runs a single probe and updates the cached status. Exposed separately
    /// from the background loop so the threshold-crossing logic is testable
    /// without a live HTTP server or a spawned task.
    pub async fn probe_once(
        &self,
        tenant_id: &str,
        route_id: &str,
        upstream_url: &str,
        config: &HealthCheckConfig,
        now_ms: i64,
        success: bool,
    ) -> HealthStatus {
        let key = Self::status_key(tenant_id, route_id, upstream_url);
        let mut status = self.load(&key).await;
        status.last_check_time = Some(now_ms);

        if success {
            status.consecutive_successes += 1;
            status.consecutive_failures = 0;
            status.last_success_time = Some(now_ms);
            if status.consecutive_successes >= config.healthy_threshold {
                status.healthy = true;
            }
        } else {
            status.consecutive_failures += 1;
            status.consecutive_successes = 0;
            status.last_failure_time = Some(now_ms);
            if status.consecutive_failures >= config.unhealthy_threshold {
                status.healthy = false;
            }
        }

        self.save(&key, &status, config.clamped_interval_ms()).await;
        status
    }

    async fn probe_upstream(&self, upstream_url: &str, endpoint: &str, timeout_ms: u64) -> bool {
        let url = format!("{upstream_url}{endpoint}");
        match self
            .http
            .get(&url)
            .timeout(Duration::from_millis(timeout_ms))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Registers a background prober for the triple. A second registration
    /// of the same triple is a no-op: the existing prober keeps running.
    pub fn register(
        self: &Arc<Self>,
        tenant_id: String,
        route_id: String,
        upstream_url: String,
        config: HealthCheckConfig,
    ) {
        if !config.enabled {
            return;
        }
        let key = Self::status_key(&tenant_id, &route_id, &upstream_url);
        {
            let mut registered = self.registered.lock().unwrap();
            if !registered.insert(key) {
                debug!("health probe for {tenant_id}/{route_id}/{upstream_url} already registered");
                return;
            }
        }

        let checker = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            let interval_ms = config.clamped_interval_ms();
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let success = checker
                            .probe_upstream(&upstream_url, &config.endpoint, config.timeout_ms)
                            .await;
                        let now_ms = chrono::Utc::now().timestamp_millis();
                        checker
                            .probe_once(&tenant_id, &route_id, &upstream_url, &config, now_ms, success)
                            .await;
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("health probe for {tenant_id}/{route_id}/{upstream_url} stopping");
                        break;
                    }
                }
            }
        });
    }

    /// Signals every registered prober to stop; called during graceful shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory_cache::InMemoryCache;

    fn config() -> HealthCheckConfig {
        HealthCheckConfig {
            enabled: true,
            endpoint: "/healthz".into(),
            interval_ms: 5000,
            timeout_ms: 1000,
            healthy_threshold: 2,
            unhealthy_threshold: 2,
        }
    }

    #[tokio::test]
    async fn starts_healthy_and_flips_after_threshold_failures() {
        let checker = HealthChecker::new(Arc::new(InMemoryCache::new()));
        let cfg = config();

        let s1 = checker
            .probe_once("t1", "r1", "http://u", &cfg, 0, false)
            .await;
        assert!(s1.healthy);
        let s2 = checker
            .probe_once("t1", "r1", "http://u", &cfg, 1000, false)
            .await;
        assert!(!s2.healthy);
        assert_eq!(s2.consecutive_failures, 2);
    }

    #[tokio::test]
    async fn recovers_after_threshold_successes() {
        let checker = HealthChecker::new(Arc::new(InMemoryCache::new()));
        let cfg = config();

        checker.probe_once("t1", "r1", "http://u", &cfg, 0, false).await;
        checker.probe_once("t1", "r1", "http://u", &cfg, 1000, false).await;
        checker.probe_once("t1", "r1", "http://u", &cfg, 2000, true).await;
        let recovered = checker
            .probe_once("t1", "r1", "http://u", &cfg, 3000, true)
            .await;
        assert!(recovered.healthy);
    }

    #[tokio::test]
    async fn a_single_success_resets_failure_streak() {
        let checker = HealthChecker::new(Arc::new(InMemoryCache::new()));
        let cfg = config();

        checker.probe_once("t1", "r1", "http://u", &cfg, 0, false).await;
        let after_success = checker
            .probe_once("t1", "r1", "http://u", &cfg, 1000, true)
            .await;
        assert_eq!(after_success.consecutive_failures, 0);
        assert!(after_success.healthy);
    }
}

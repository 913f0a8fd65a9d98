//! Sliding-window rate limiter: a fixed 1000ms window, backed by
//! the shared cache's sorted-set pipeline so concurrent callers across
//! processes share one count.

use crate::cache::CacheClient;
use crate::models::TenantRateLimit;
use log::debug;
use std::sync::Arc;
use uuid::Uuid;

const WINDOW_MS: i64 = 1000;
const RATE_LIMIT_TTL_SECS: u64 = 2;

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("cache error: {0}")]
    Cache(#[from] crate::cache::CacheError),
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u64,
    pub reset_at_ms: i64,
    pub limit: u64,
}

pub struct RateLimiter {
    cache: Arc<dyn CacheClient>,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn CacheClient>) -> Self {
        Self { cache }
    }

    /// `key` is the fully-qualified scope, e.g. `tenant:{id}` or
    /// `tenant:{id}:route:{id}`; `now_ms` is the caller-supplied clock so
    /// tests can drive the window deterministically.
    pub async fn check(
        &self,
        key: &str,
        limit_cfg: &TenantRateLimit,
        now_ms: i64,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let limit = limit_cfg.burst_size.unwrap_or(limit_cfg.requests_per_second);
        let cache_key = format!("ratelimit:{key}");
        let nonce = Uuid::new_v4();
        let member = format!("{now_ms}:{nonce}");

        let result = self
            .cache
            .rate_limit_pipeline(&cache_key, now_ms, WINDOW_MS, &member, RATE_LIMIT_TTL_SECS)
            .await?;

        let reset_at_ms = result
            .oldest_score_ms
            .map(|score| score + WINDOW_MS)
            .unwrap_or(now_ms + WINDOW_MS);

        if result.count_before >= limit as u64 {
            debug!("rate limit denied for {key}: count_before={}", result.count_before);
            self.cache.zrem(&cache_key, &member).await?;
            return Ok(RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at_ms,
                limit: limit as u64,
            });
        }

        let remaining = (limit as u64)
            .saturating_sub(result.count_before)
            .saturating_sub(1);

        Ok(RateLimitDecision {
            allowed: true,
            remaining,
            reset_at_ms,
            limit: limit as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory_cache::InMemoryCache;

    fn limit(rps: u32, burst: Option<u32>) -> TenantRateLimit {
        TenantRateLimit {
            requests_per_second: rps,
            burst_size: burst,
        }
    }

    #[tokio::test]
    async fn allows_up_to_limit_then_denies() {
        let cache = Arc::new(InMemoryCache::new());
        let limiter = RateLimiter::new(cache);
        let cfg = limit(2, None);

        let d1 = limiter.check("tenant:t1", &cfg, 1000).await.unwrap();
        assert!(d1.allowed);
        assert_eq!(d1.remaining, 1);

        let d2 = limiter.check("tenant:t1", &cfg, 1010).await.unwrap();
        assert!(d2.allowed);
        assert_eq!(d2.remaining, 0);

        let d3 = limiter.check("tenant:t1", &cfg, 1020).await.unwrap();
        assert!(!d3.allowed);
        assert_eq!(d3.remaining, 0);
    }

    #[tokio::test]
    async fn window_slides_after_1000ms() {
        let cache = Arc::new(InMemoryCache::new());
        let limiter = RateLimiter::new(cache);
        let cfg = limit(1, None);

        assert!(limiter.check("tenant:t1", &cfg, 0).await.unwrap().allowed);
        assert!(!limiter.check("tenant:t1", &cfg, 500).await.unwrap().allowed);
        assert!(limiter.check("tenant:t1", &cfg, 1001).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn burst_size_overrides_requests_per_second() {
        let cache = Arc::new(InMemoryCache::new());
        let limiter = RateLimiter::new(cache);
        let cfg = limit(1, Some(5));

        for i in 0..5 {
            let d = limiter.check("tenant:t1", &cfg, i).await.unwrap();
            assert!(d.allowed, "request {i} should be allowed under burst");
        }
        assert!(!limiter.check("tenant:t1", &cfg, 5).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn denied_request_does_not_consume_future_quota() {
        let cache = Arc::new(InMemoryCache::new());
        let limiter = RateLimiter::new(cache);
        let cfg = limit(1, None);

        assert!(limiter.check("tenant:t1", &cfg, 0).await.unwrap().allowed);
        assert!(!limiter.check("tenant:t1", &cfg, 100).await.unwrap().allowed);
        // Denied attempt must have been un-added; next window opens cleanly.
        assert!(limiter.check("tenant:t1", &cfg, 1001).await.unwrap().allowed);
    }
}

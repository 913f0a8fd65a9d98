//! Shared key-value cache abstraction.
//!
//! The core never talks to Redis directly outside of [`redis_cache`]; every
//! component that needs the cache (tenant authenticator, rate limiter,
//! circuit breaker, health checker) is written against [`CacheClient`], a
//! narrow trait covering string get/setex/del and the sorted-set primitives
//! needed for the sliding-window rate limiter. [`memory_cache::InMemoryCache`] implements
//! the same trait for tests, so component logic never needs a live Redis to
//! be exercised.

pub mod memory_cache;
pub mod redis_cache;

use futures::future::BoxFuture;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Outcome of the atomic sliding-window pipeline described above.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPipelineResult {
    /// Count of members remaining in the window *before* the candidate was added.
    pub count_before: u64,
    /// Score (ms) of the oldest member after eviction and insertion, if any.
    pub oldest_score_ms: Option<i64>,
}

/// Narrow shared-cache interface. All methods return boxed futures so the
/// trait stays object-safe and components can hold `Arc<dyn CacheClient>`.
pub trait CacheClient: Send + Sync {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<String>, CacheError>>;

    fn setex(&self, key: &str, ttl_secs: u64, value: &str) -> BoxFuture<'_, Result<(), CacheError>>;

    fn del(&self, key: &str) -> BoxFuture<'_, Result<(), CacheError>>;

    /// Runs the rate-limit window pipeline atomically:
    /// `ZREMRANGEBYSCORE` (evict), `ZCARD` (count before), `ZADD` (record
    /// candidate), `EXPIRE` (refresh TTL), then reads the oldest remaining score.
    fn rate_limit_pipeline(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        member: &str,
        ttl_secs: u64,
    ) -> BoxFuture<'_, Result<RateLimitPipelineResult, CacheError>>;

    /// Removes a single sorted-set member; used to undo the candidate ZADD
    /// on denial so denied requests never consume future quota.
    fn zrem(&self, key: &str, member: &str) -> BoxFuture<'_, Result<(), CacheError>>;
}

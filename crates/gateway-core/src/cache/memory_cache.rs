use super::{CacheClient, CacheError, RateLimitPipelineResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct StringEntry {
    value: String,
    expires_at: Instant,
}

/// In-process stand-in for Redis, used by component unit tests and by the
/// integration tests in `tests/`. Sorted sets are kept as plain `Vec<(member,
/// score)>`; this is adequate at test scale and keeps the fake dependency-free.
#[derive(Default)]
pub struct InMemoryCache {
    strings: Mutex<HashMap<String, StringEntry>>,
    sorted_sets: Mutex<HashMap<String, Vec<(String, f64)>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheClient for InMemoryCache {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<String>, CacheError>> {
        let key = key.to_string();
        async move {
            let mut strings = self.strings.lock().unwrap();
            if let Some(entry) = strings.get(&key) {
                if entry.expires_at > Instant::now() {
                    return Ok(Some(entry.value.clone()));
                }
                strings.remove(&key);
            }
            Ok(None)
        }
        .boxed()
    }

    fn setex(&self, key: &str, ttl_secs: u64, value: &str) -> BoxFuture<'_, Result<(), CacheError>> {
        let key = key.to_string();
        let value = value.to_string();
        async move {
            self.strings.lock().unwrap().insert(
                key,
                StringEntry {
                    value,
                    expires_at: Instant::now() + Duration::from_secs(ttl_secs.max(1)),
                },
            );
            Ok(())
        }
        .boxed()
    }

    fn del(&self, key: &str) -> BoxFuture<'_, Result<(), CacheError>> {
        let key = key.to_string();
        async move {
            self.strings.lock().unwrap().remove(&key);
            self.sorted_sets.lock().unwrap().remove(&key);
            Ok(())
        }
        .boxed()
    }

    fn rate_limit_pipeline(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        member: &str,
        _ttl_secs: u64,
    ) -> BoxFuture<'_, Result<RateLimitPipelineResult, CacheError>> {
        let key = key.to_string();
        let member = member.to_string();
        async move {
            let mut sets = self.sorted_sets.lock().unwrap();
            let entries = sets.entry(key).or_default();

            // ZREMRANGEBYSCORE ... 0 (now-windowMs): the `(` makes the upper
            // bound exclusive, so a member scored exactly at the floor survives.
            let floor = now_ms - window_ms;
            entries.retain(|(_, score)| *score >= floor as f64);

            let count_before = entries.len() as u64;
            entries.push((member, now_ms as f64));

            let oldest_score_ms = entries
                .iter()
                .map(|(_, score)| *score as i64)
                .min();

            Ok(RateLimitPipelineResult {
                count_before,
                oldest_score_ms,
            })
        }
        .boxed()
    }

    fn zrem(&self, key: &str, member: &str) -> BoxFuture<'_, Result<(), CacheError>> {
        let key = key.to_string();
        let member = member.to_string();
        async move {
            if let Some(entries) = self.sorted_sets.lock().unwrap().get_mut(&key) {
                entries.retain(|(m, _)| m != &member);
            }
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn setex_then_get_round_trips() {
        let cache = InMemoryCache::new();
        cache.setex("k", 5, "v").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn get_missing_key_is_none() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn rate_limit_pipeline_evicts_then_counts() {
        let cache = InMemoryCache::new();
        cache
            .rate_limit_pipeline("rl", 1_000_000, 1000, "1000000:a", 2)
            .await
            .unwrap();
        let second = cache
            .rate_limit_pipeline("rl", 1_000_500, 1000, "1000500:b", 2)
            .await
            .unwrap();
        assert_eq!(second.count_before, 1);

        let evicted = cache
            .rate_limit_pipeline("rl", 1_002_200, 1000, "1002200:c", 2)
            .await
            .unwrap();
        assert_eq!(evicted.count_before, 0);
    }

    #[tokio::test]
    async fn zrem_removes_candidate_on_denial() {
        let cache = InMemoryCache::new();
        cache
            .rate_limit_pipeline("rl", 1000, 1000, "1000:a", 2)
            .await
            .unwrap();
        cache.zrem("rl", "1000:a").await.unwrap();
        let after = cache
            .rate_limit_pipeline("rl", 1001, 1000, "1001:b", 2)
            .await
            .unwrap();
        assert_eq!(after.count_before, 0);
    }
}

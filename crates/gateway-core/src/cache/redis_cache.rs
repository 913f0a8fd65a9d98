use super::{CacheClient, CacheError, RateLimitPipelineResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Redis-backed [`CacheClient`]. Built once at startup from `REDIS_URL` and
/// cloned (the connection manager is itself cheaply cloneable and
/// reconnects transparently) into every component that needs cache access.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| CacheError::Backend(e.to_string()))?;
        let conn = client
            .get_tokio_connection_manager()
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(Self { conn })
    }
}

impl CacheClient for RedisCache {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<String>, CacheError>> {
        let key = key.to_string();
        let mut conn = self.conn.clone();
        async move {
            conn.get(&key)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))
        }
        .boxed()
    }

    fn setex(&self, key: &str, ttl_secs: u64, value: &str) -> BoxFuture<'_, Result<(), CacheError>> {
        let key = key.to_string();
        let value = value.to_string();
        let mut conn = self.conn.clone();
        async move {
            conn.set_ex(&key, value, ttl_secs)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))
        }
        .boxed()
    }

    fn del(&self, key: &str) -> BoxFuture<'_, Result<(), CacheError>> {
        let key = key.to_string();
        let mut conn = self.conn.clone();
        async move {
            let _: i64 = conn
                .del(&key)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))?;
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
        ttl_secs: u64,
    ) -> BoxFuture<'_, Result<RateLimitPipelineResult, CacheError>> {
        let key = key.to_string();
        let member = member.to_string();
        let mut conn = self.conn.clone();
        async move {
            // Exclusive upper bound: a member scored exactly at the floor
            // must survive, matching `ZREMRANGEBYSCORE key 0 (now-windowMs)`.
            let floor = now_ms - window_ms;
            let mut pipe = redis::pipe();
            pipe.atomic()
                .cmd("ZREMRANGEBYSCORE")
                .arg(&key)
                .arg(0)
                .arg(format!("({floor}"))
                .ignore()
                .cmd("ZCARD")
                .arg(&key)
                .cmd("ZADD")
                .arg(&key)
                .arg(now_ms)
                .arg(&member)
                .ignore()
                .cmd("EXPIRE")
                .arg(&key)
                .arg(ttl_secs)
                .ignore();

            let (count_before,): (u64,) = pipe
                .query_async(&mut conn)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))?;

            let oldest: Vec<(String, f64)> = conn
                .zrangebyscore_withscores(&key, "-inf", "+inf")
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))?;
            let oldest_score_ms = oldest.first().map(|(_, score)| *score as i64);

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
        let mut conn = self.conn.clone();
        async move {
            let _: i64 = conn
                .zrem(&key, &member)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))?;
            Ok(())
        }
        .boxed()
    }
}

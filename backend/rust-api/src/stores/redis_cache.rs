use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::metrics::{record_cache_hit, record_cache_miss, track_cache_operation};

use super::{CacheStore, StoreError, StoreResult};

fn redis_err(err: redis::RedisError) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

/// Production `CacheStore` over a shared Redis connection manager.
pub struct RedisCacheStore {
    redis: ConnectionManager,
}

impl RedisCacheStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.redis.clone();
        let value: Option<String> = track_cache_operation("get", async {
            redis::cmd("GET")
                .arg(key)
                .query_async(&mut conn)
                .await
                .map_err(redis_err)
        })
        .await?;
        match &value {
            Some(_) => record_cache_hit(),
            None => record_cache_miss(),
        }
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> StoreResult<()> {
        let mut conn = self.redis.clone();
        track_cache_operation("set_ex", async {
            redis::cmd("SETEX")
                .arg(key)
                .arg(ttl_seconds)
                .arg(value)
                .query_async::<()>(&mut conn)
                .await
                .map_err(redis_err)
        })
        .await
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.redis.clone();
        track_cache_operation("del", async {
            redis::cmd("DEL")
                .arg(key)
                .query_async::<()>(&mut conn)
                .await
                .map_err(redis_err)
        })
        .await
    }

    async fn incr_window(&self, key: &str, window_seconds: u64) -> StoreResult<i64> {
        // INCR and EXPIRE must be one atomic step or a crash between them
        // leaves a counter that never expires.
        let lua_script = r#"
        local current = redis.call('INCR', KEYS[1])
        if current == 1 then
            redis.call('EXPIRE', KEYS[1], ARGV[1])
        end
        return current
        "#;
        let mut conn = self.redis.clone();
        track_cache_operation("incr_window", async {
            redis::Script::new(lua_script)
                .key(key)
                .arg(window_seconds)
                .invoke_async(&mut conn)
                .await
                .map_err(redis_err)
        })
        .await
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.redis.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(redis_err)
    }
}

use super::error::LockError;
use super::{LockClient, LockResult};
use crate::types::params::LockArgs;
use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use std::time::Duration;
use tracing::debug;

/// Lock store backed by Redis. Keys are plain strings with a millisecond expiry.
pub struct RedisLockClient {
    pool: Pool,
}

impl RedisLockClient {
    pub fn new(args: &LockArgs) -> Result<Self, LockError> {
        let cfg = Config::from_url(&args.redis_url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl LockClient for RedisLockClient {
    async fn acquire_lock_if_available(&self, key: &str, value: &str, ttl: Duration) -> Result<LockResult, LockError> {
        let mut conn = self.pool.get().await?;
        // SET .. NX PX replies OK when the key was created and nil when it already exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        match reply {
            Some(_) => Ok(LockResult::Acquired),
            None => {
                debug!(key = %key, "Lock key already present");
                Ok(LockResult::AlreadyHeld)
            }
        }
    }

    async fn release_lock(&self, key: &str) -> Result<LockResult, LockError> {
        let mut conn = self.pool.get().await?;
        let expired: i64 = conn.expire(key, 0).await?;

        if expired == 1 {
            Ok(LockResult::Released)
        } else {
            Ok(LockResult::NotFound)
        }
    }
}

use crate::cli::lock::redis::RedisCliArgs;
use crate::error::ConsumerError;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct LockArgs {
    pub redis_url: String,
    /// Operation class prefixed to every key taken by the event path
    pub namespace: String,
    pub ttl: Duration,
}

impl TryFrom<RedisCliArgs> for LockArgs {
    type Error = ConsumerError;

    fn try_from(args: RedisCliArgs) -> Result<Self, Self::Error> {
        if args.redis_url.trim().is_empty() {
            return Err(ConsumerError::ConfigError("redis_url must not be empty".to_string()));
        }
        if args.lock_namespace.trim().is_empty() {
            return Err(ConsumerError::ConfigError("lock_namespace must not be empty".to_string()));
        }
        if args.lock_ttl_ms == 0 {
            return Err(ConsumerError::ConfigError("lock_ttl_ms must be greater than 0".to_string()));
        }
        Ok(Self {
            redis_url: args.redis_url,
            namespace: args.lock_namespace,
            ttl: Duration::from_millis(args.lock_ttl_ms),
        })
    }
}

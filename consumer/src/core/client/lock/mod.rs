pub mod error;
pub mod redis;
pub mod service;

use async_trait::async_trait;
use error::LockError;
use std::time::Duration;

pub use self::redis::RedisLockClient;
pub use service::{LockHandle, LockService};

/// Outcome of a single lock store operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockResult {
    Acquired,
    AlreadyHeld,
    Released,
    /// The key had already expired or was never created
    NotFound,
}

/// Key-value store offering atomic create-if-absent with expiry and forced expiry
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LockClient: Send + Sync {
    /// Create `key` holding `value` for `ttl`, only if the key does not exist yet
    async fn acquire_lock_if_available(&self, key: &str, value: &str, ttl: Duration) -> Result<LockResult, LockError>;

    /// Expire `key` immediately
    async fn release_lock(&self, key: &str) -> Result<LockResult, LockError>;
}

use super::error::LockError;
use super::{LockClient, LockResult};
use crate::types::constant::LOCK_SENTINEL_VALUE;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Proof of a successful acquire. Equal to the key that was created.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockHandle(String);

impl LockHandle {
    /// Key layout shared by every caller: `{namespace}:{identifier}`
    pub fn key_for(namespace: &str, identifier: &str) -> String {
        format!("{}:{}", namespace, identifier)
    }

    pub fn key(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// TTL-bound mutual exclusion on top of a [`LockClient`].
///
/// A token is never held longer than its TTL, even if the holder dies before releasing it.
#[derive(Clone)]
pub struct LockService {
    client: Arc<dyn LockClient>,
}

impl LockService {
    pub fn new(client: Arc<dyn LockClient>) -> Self {
        Self { client }
    }

    /// acquire - Create the lock key if nobody holds it
    /// # Arguments
    /// * `key` - The full lock key
    /// * `ttl` - How long the token lives without an explicit release
    /// # Returns
    /// * `LockHandle` - The handle to pass to [`release`](Self::release)
    /// # Errors
    /// * `LockError::Unavailable` - The key is held. Expected under contention, logged at debug
    /// * `LockError::Store` / `LockError::Pool` - The lock store failed, logged as an error
    pub async fn acquire(&self, key: &str, ttl: Duration) -> Result<LockHandle, LockError> {
        if key.is_empty() {
            return Err(LockError::InvalidArguments("lock key must not be empty".to_string()));
        }
        if ttl.is_zero() {
            return Err(LockError::InvalidArguments("lock ttl must be greater than 0".to_string()));
        }

        let start = Instant::now();
        let result = self.client.acquire_lock_if_available(key, LOCK_SENTINEL_VALUE, ttl).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(LockResult::Acquired) => {
                debug!(key = %key, ttl_ms = ttl.as_millis() as u64, elapsed_ms, "Lock acquired");
                Ok(LockHandle(key.to_string()))
            }
            Ok(other) => {
                debug!(key = %key, result = ?other, elapsed_ms, "Lock unavailable, another worker holds it");
                Err(LockError::Unavailable { key: key.to_string() })
            }
            Err(e) => {
                error!(key = %key, error = %e, elapsed_ms, "Lock store failed while acquiring");
                Err(e)
            }
        }
    }

    /// Expire the lock right away. Best effort: a missing key or a store failure is only a warning,
    /// the token expires on its own anyway.
    pub async fn release(&self, handle: &LockHandle) {
        match self.client.release_lock(handle.key()).await {
            Ok(LockResult::Released) => debug!(key = %handle, "Lock released"),
            Ok(_) => warn!(key = %handle, "Lock was already expired or never existed"),
            Err(e) => warn!(key = %handle, error = %e, "Failed to release lock, leaving it to expire"),
        }
    }

    /// run_exclusively - Run `task` while holding `{namespace}:{identifier}`
    ///
    /// Malformed arguments are returned as `LockError::InvalidArguments` before the store is
    /// touched. When the lock is held elsewhere the task is never invoked and the call resolves
    /// with `LockError::Unavailable`. With `release_after` the lock is released once the task
    /// finishes, before its result is handed back; otherwise it lives until its TTL.
    ///
    /// # Arguments
    /// * `namespace` - Operation class
    /// * `identifier` - The record (or other resource) being claimed
    /// * `ttl` - Lifetime of the token
    /// * `release_after` - Release as soon as the task completes
    /// * `task` - The critical section
    pub async fn run_exclusively<F, Fut, T, E>(
        &self,
        namespace: &str,
        identifier: &str,
        ttl: Duration,
        release_after: bool,
        task: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        Self::validate(namespace, identifier, ttl)?;

        let handle = self.acquire(&LockHandle::key_for(namespace, identifier), ttl).await?;
        let result = task().await;
        if release_after {
            self.release(&handle).await;
        }
        result
    }

    /// Same as [`run_exclusively`](Self::run_exclusively) without the release. The token only expires.
    pub async fn lock_and_run<F, Fut, T, E>(
        &self,
        namespace: &str,
        identifier: &str,
        ttl: Duration,
        task: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        self.run_exclusively(namespace, identifier, ttl, false, task).await
    }

    fn validate(namespace: &str, identifier: &str, ttl: Duration) -> Result<(), LockError> {
        if namespace.trim().is_empty() {
            return Err(LockError::InvalidArguments("namespace must not be empty".to_string()));
        }
        if identifier.trim().is_empty() {
            return Err(LockError::InvalidArguments("identifier must not be empty".to_string()));
        }
        if ttl.is_zero() {
            return Err(LockError::InvalidArguments("ttl must be greater than 0".to_string()));
        }
        Ok(())
    }
}

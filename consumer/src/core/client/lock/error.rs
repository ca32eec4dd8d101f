use thiserror::Error;

#[derive(Error, Debug)]
pub enum LockError {
    /// Someone else holds the key. The normal contention case, not a fault.
    #[error("Lock unavailable: {key} is already held")]
    Unavailable { key: String },

    #[error("Lock store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("Lock store pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("Failed to create lock store pool: {0}")]
    PoolCreation(#[from] deadpool_redis::CreatePoolError),

    /// Malformed call. Reported before touching the store.
    #[error("Invalid lock arguments: {0}")]
    InvalidArguments(String),
}

impl LockError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, LockError::Unavailable { .. })
    }
}

use crate::core::client::database::DatabaseError;
use thiserror::Error;

pub type EventSystemResult<T> = Result<T, EventSystemError>;

/// Failures of the long running components: listener, catch-up scanner, controller
#[derive(Error, Debug)]
pub enum EventSystemError {
    #[error("Failed to open change stream: {0}")]
    SubscriptionFailed(#[source] DatabaseError),

    #[error("Catch-up scan failed: {0}")]
    CatchupFailed(#[source] DatabaseError),

    #[error("Worker task failed to join: {0}")]
    WorkerJoinError(#[from] tokio::task::JoinError),

    #[error("Mutex poisoned: {0}")]
    MutexPoisonError(String),

    #[error("Worker already started")]
    AlreadyStarted,
}

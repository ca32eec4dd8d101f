pub mod event;
pub mod job;

use thiserror::Error;

use crate::core::error::ConsumerCoreError;
use crate::error::event::EventSystemError;

/// Result type for consumer operations
pub type ConsumerResult<T> = Result<T, ConsumerError>;

/// Error types for the consumer
#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("Consumer Core Error: {0}")]
    ConsumerCoreError(#[from] ConsumerCoreError),

    #[error("Event System Error: {0}")]
    EventSystemError(#[from] EventSystemError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Consumer Error: {0}")]
    ConsumerAnyHowError(#[from] anyhow::Error),
}

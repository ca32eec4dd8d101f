use super::client::{database::DatabaseError, lock::error::LockError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsumerCoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Lock Error: {0}")]
    LockError(#[from] LockError),
}

use crate::core::client::database::DatabaseError;
use crate::core::client::lock::error::LockError;
use mongodb::bson::oid::ObjectId;
use thiserror::Error;

/// Failures on the claim -> process -> complete path of a single record
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Lock error: {0}")]
    LockError(#[from] LockError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Processing failed for job {job_id}: {reason}")]
    ProcessingFailed { job_id: ObjectId, reason: String },

    #[error("Failed to request catch-up scan: {0}")]
    CatchupRequestFailed(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl JobError {
    /// Lock contention. Another worker is on this record, nothing went wrong.
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, JobError::LockError(e) if e.is_unavailable())
    }
}

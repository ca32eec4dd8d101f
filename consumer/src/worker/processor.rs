use crate::error::job::JobError;
use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;

/// The unit of work performed on a record while its lock is held, right before it is marked
/// `completed`. An error leaves the record as it is, still eligible for a later attempt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job_id: ObjectId) -> Result<(), JobError>;
}

/// Completes every claimed record without doing anything else
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopJobProcessor;

#[async_trait]
impl JobProcessor for NoopJobProcessor {
    async fn process(&self, _job_id: ObjectId) -> Result<(), JobError> {
        Ok(())
    }
}

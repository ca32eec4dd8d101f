use crate::error::job::JobError;
use crate::types::jobs::change_event::ResumePosition;
use crate::types::jobs::types::{JobStatus, RetrySource};
use mongodb::bson::DateTime;
use serde::Serialize;

/// Fields to `$set` on a record. `None` fields are left untouched,
/// the identifier and `createdAt` are never changed from here.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobItemUpdates {
    pub status: Option<JobStatus>,
    pub completed_at: Option<DateTime>,
    pub resume_token: Option<ResumePosition>,
    pub retry_source: Option<RetrySource>,
}

impl Default for JobItemUpdates {
    fn default() -> Self {
        Self::new()
    }
}

impl JobItemUpdates {
    pub fn new() -> Self {
        JobItemUpdates { status: None, completed_at: None, resume_token: None, retry_source: None }
    }

    pub fn update_status(mut self, status: JobStatus) -> JobItemUpdates {
        self.status = Some(status);
        self
    }
    pub fn update_completed_at(mut self, completed_at: DateTime) -> JobItemUpdates {
        self.completed_at = Some(completed_at);
        self
    }
    pub fn update_resume_token(mut self, resume_token: ResumePosition) -> JobItemUpdates {
        self.resume_token = Some(resume_token);
        self
    }
    pub fn update_retry_source(mut self, retry_source: RetrySource) -> JobItemUpdates {
        self.retry_source = Some(retry_source);
        self
    }
    pub fn build(self) -> Result<JobItemUpdates, JobError> {
        if self.status.is_none()
            && self.completed_at.is_none()
            && self.resume_token.is_none()
            && self.retry_source.is_none()
        {
            Err(JobError::Other("No field to be updated, likely a false call".to_string()))
        } else {
            Ok(self)
        }
    }

    /// The `completed` transition, stamped now.
    /// Live events carry the feed position, catch-up completions carry their provenance tag instead.
    pub fn completion(resume_token: Option<ResumePosition>, retry_source: Option<RetrySource>) -> JobItemUpdates {
        let mut update = Self::new().update_status(JobStatus::Completed).update_completed_at(DateTime::now());
        if let Some(resume_token) = resume_token {
            update = update.update_resume_token(resume_token);
        }
        if let Some(retry_source) = retry_source {
            update = update.update_retry_source(retry_source);
        }
        update
    }
}

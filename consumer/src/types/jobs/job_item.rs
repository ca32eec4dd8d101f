use crate::types::jobs::change_event::ResumePosition;
use crate::types::jobs::types::{JobStatus, RetrySource};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

/// A record of the watched collection, as far as this service is concerned.
/// Any other field on the stored document is ignored on read and never written.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobItem {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub status: JobStatus,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_token: Option<ResumePosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_source: Option<RetrySource>,
}

impl JobItem {
    pub fn new(id: ObjectId, status: JobStatus, retry_count: u32) -> Self {
        Self {
            id,
            status,
            retry_count,
            created_at: Some(id.timestamp()),
            completed_at: None,
            resume_token: None,
            retry_source: None,
        }
    }

    pub fn is_eligible(&self, retry_limit: u32) -> bool {
        self.status.is_eligible(self.retry_count, retry_limit)
    }
}

pub mod error;
pub mod filters;
pub mod mongodb;

use crate::types::jobs::change_event::{JobChangeEvent, ResumePosition};
use crate::types::jobs::job_updates::JobItemUpdates;
use crate::types::jobs::types::CatchupOrder;
use ::mongodb::bson::oid::ObjectId;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

pub use error::{ChangeFeedError, DatabaseError, FeedFault};
pub use self::mongodb::MongoDbClient;

/// Live change events for eligible records. A `DatabaseError::ChangeFeed` item is a fault
/// reported by the server, the stream may or may not continue after it.
pub type JobChangeStream = BoxStream<'static, Result<JobChangeEvent, DatabaseError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Record store operations needed by the consumer
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Subscribe to changes on records that are `queued`, or `failed` with `retryCount < retry_limit`.
    /// Starts right after `resume_after` when given.
    async fn watch_jobs(
        &self,
        retry_limit: u32,
        resume_after: Option<ResumePosition>,
    ) -> Result<JobChangeStream, DatabaseError>;

    /// Apply `update` to the record with `id` unless it is already `completed`.
    /// A zero `modified_count` means nothing was changed.
    async fn complete_job(&self, id: ObjectId, update: JobItemUpdates) -> Result<UpdateResult, DatabaseError>;

    /// Number of eligible records with an identifier strictly below `reference_id`
    async fn count_pending_jobs_before(&self, reference_id: ObjectId, retry_limit: u32) -> Result<u64, DatabaseError>;

    /// Identifiers of eligible records strictly below `reference_id`, in `order`.
    /// Only `_id` is read, so a record with fields this service cannot decode is still returned.
    async fn get_pending_job_ids_before(
        &self,
        reference_id: ObjectId,
        retry_limit: u32,
        order: CatchupOrder,
    ) -> Result<Vec<ObjectId>, DatabaseError>;

    /// Resume token stored on the most recently completed record, if any
    async fn get_latest_resume_position(&self) -> Result<Option<ResumePosition>, DatabaseError>;
}

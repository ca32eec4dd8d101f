use super::error::{ChangeFeedError, DatabaseError};
use super::filters::{
    catchup_sort, change_stream_pipeline, count_pending_before_pipeline, latest_resume_position_pipeline,
    not_completed_filter, pending_before_filter,
};
use super::{DatabaseClient, JobChangeStream, UpdateResult};
use crate::types::jobs::change_event::{JobChangeEvent, ResumePosition};
use crate::types::jobs::job_updates::JobItemUpdates;
use crate::types::jobs::types::CatchupOrder;
use crate::types::params::DatabaseArgs;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Bson, Document};
use mongodb::change_stream::event::{ChangeStreamEvent, ResumeToken};
use mongodb::options::{ChangeStreamOptions, FindOptions, FullDocumentType};
use mongodb::{bson, Client, Collection, Database};
use std::sync::Arc;
use tracing::{debug, warn};

/// MongoDB client implementation
pub struct MongoDbClient {
    database: Arc<Database>,
    collection_name: String,
}

impl MongoDbClient {
    pub async fn new(config: &DatabaseArgs) -> Result<Self, DatabaseError> {
        let client = Client::with_uri_str(&config.connection_uri).await?;
        let database = Arc::new(client.database(&config.database_name));
        Ok(Self { database, collection_name: config.collection_name.clone() })
    }

    /// Untyped view of the collection. Change events, aggregations and catch-up queries are read
    /// through it so that a record this service cannot fully decode still yields its identifier.
    fn raw_collection(&self) -> Collection<Document> {
        self.database.collection(&self.collection_name)
    }

    /// Runs an aggregation expected to produce at most one document
    async fn aggregate_one(&self, pipeline: Vec<Document>) -> Result<Option<Document>, DatabaseError> {
        let mut cursor = self.raw_collection().aggregate(pipeline, None).await?;
        Ok(cursor.try_next().await?)
    }
}

fn position_from_token(token: &ResumeToken) -> Result<ResumePosition, DatabaseError> {
    match bson::to_bson(token)? {
        Bson::Document(token) => Ok(ResumePosition::new(token)),
        other => Err(DatabaseError::MalformedChangeEvent(format!("resume token is not a document: {}", other))),
    }
}

fn token_from_position(position: ResumePosition) -> Result<ResumeToken, DatabaseError> {
    Ok(bson::from_bson(Bson::Document(position.0))?)
}

fn to_change_event(event: ChangeStreamEvent<Document>) -> Result<JobChangeEvent, DatabaseError> {
    let resume_position = position_from_token(&event.id)?;
    let document_id = event
        .document_key
        .as_ref()
        .and_then(|key| key.get_object_id("_id").ok())
        .or_else(|| event.full_document.as_ref().and_then(|doc| doc.get_object_id("_id").ok()))
        .ok_or_else(|| {
            DatabaseError::MalformedChangeEvent(format!(
                "{:?} event does not carry an ObjectId document key",
                event.operation_type
            ))
        })?;
    Ok(JobChangeEvent { resume_position, document_id })
}

/// Keeps the `_id` of every document that has an ObjectId one, in input order
fn ids_from_documents(documents: Vec<Document>) -> Vec<ObjectId> {
    documents
        .into_iter()
        .filter_map(|document| match document.get_object_id("_id") {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(id = ?document.get("_id"), error = %e, "Skipping pending record without an ObjectId identifier");
                None
            }
        })
        .collect()
}

fn count_from_document(document: &Document) -> Result<u64, DatabaseError> {
    match document.get("count") {
        Some(Bson::Int32(count)) => Ok(*count as u64),
        Some(Bson::Int64(count)) => Ok(*count as u64),
        Some(other) => Err(DatabaseError::FailedToSerializeDocument(format!("unexpected count value: {}", other))),
        None => Err(DatabaseError::KeyNotFound("count".to_string())),
    }
}

#[async_trait]
impl DatabaseClient for MongoDbClient {
    async fn watch_jobs(
        &self,
        retry_limit: u32,
        resume_after: Option<ResumePosition>,
    ) -> Result<JobChangeStream, DatabaseError> {
        let mut options = ChangeStreamOptions::default();
        options.full_document = Some(FullDocumentType::UpdateLookup);
        let resuming = resume_after.is_some();
        if let Some(position) = resume_after {
            options.start_after = Some(token_from_position(position)?);
        }

        let stream = self.raw_collection().watch(change_stream_pipeline(retry_limit), options).await?;
        debug!(collection = %self.collection_name, resuming, "Change stream opened");

        Ok(stream
            .map(|item| match item {
                Ok(event) => to_change_event(event),
                Err(e) => Err(DatabaseError::ChangeFeed(ChangeFeedError::from(&e))),
            })
            .boxed())
    }

    async fn complete_job(&self, id: ObjectId, update: JobItemUpdates) -> Result<UpdateResult, DatabaseError> {
        let updates = bson::to_document(&update)?;

        // remove null values from the updates
        let mut non_null_updates = Document::new();
        updates.into_iter().for_each(|(k, v)| {
            if v != Bson::Null {
                non_null_updates.insert(k, v);
            }
        });

        if non_null_updates.is_empty() {
            return Err(DatabaseError::NoUpdateFound("No field to be updated, likely a false call".to_string()));
        }

        let result =
            self.raw_collection().update_one(not_completed_filter(id), doc! { "$set": non_null_updates }, None).await?;
        if result.matched_count == 0 {
            warn!(job_id = %id, "No pending record matched, it is either completed or gone");
        } else {
            debug!(job_id = %id, modified = result.modified_count, "Record updated");
        }
        Ok(UpdateResult { matched_count: result.matched_count, modified_count: result.modified_count })
    }

    async fn count_pending_jobs_before(&self, reference_id: ObjectId, retry_limit: u32) -> Result<u64, DatabaseError> {
        // $group emits nothing at all when no record matched
        match self.aggregate_one(count_pending_before_pipeline(reference_id, retry_limit)).await? {
            Some(document) => count_from_document(&document),
            None => Ok(0),
        }
    }

    async fn get_pending_job_ids_before(
        &self,
        reference_id: ObjectId,
        retry_limit: u32,
        order: CatchupOrder,
    ) -> Result<Vec<ObjectId>, DatabaseError> {
        let options = FindOptions::builder().sort(catchup_sort(order)).projection(doc! { "_id": 1 }).build();
        let documents: Vec<Document> = self
            .raw_collection()
            .find(pending_before_filter(reference_id, retry_limit), options)
            .await?
            .try_collect()
            .await?;
        let ids = ids_from_documents(documents);
        debug!(reference_id = %reference_id, count = ids.len(), order = %order, "Fetched pending records");
        Ok(ids)
    }

    async fn get_latest_resume_position(&self) -> Result<Option<ResumePosition>, DatabaseError> {
        let Some(document) = self.aggregate_one(latest_resume_position_pipeline()).await? else {
            return Ok(None);
        };
        match document.get("resumeToken") {
            Some(Bson::Document(token)) => Ok(Some(ResumePosition::new(token.clone()))),
            Some(_) | None => Ok(None),
        }
    }
}

use mongodb::bson::oid::ObjectId;
use mongodb::bson::Document;
use serde::{Deserialize, Serialize};

/// Opaque cursor into the change feed, as issued by the store.
///
/// Stored verbatim on a completed record under `resumeToken` so that a later
/// subscription can start right after the event that completed it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct ResumePosition(pub Document);

impl ResumePosition {
    pub fn new(token: Document) -> Self {
        Self(token)
    }
}

/// The two things the event path needs out of a raw change event.
#[derive(Debug, Clone, PartialEq)]
pub struct JobChangeEvent {
    pub resume_position: ResumePosition,
    pub document_id: ObjectId,
}

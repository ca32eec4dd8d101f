//! Query documents shared by the change stream, the catch-up path and the in-memory test store.

use crate::types::jobs::types::{CatchupOrder, JobStatus};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Document};

/// `$or` over the two eligible shapes. `prefix` is `"fullDocument."` inside a change stream
/// and empty on direct queries.
pub fn eligible_status_filter(prefix: &str, retry_limit: u32) -> Document {
    let status = format!("{prefix}status");
    let retry_count = format!("{prefix}retryCount");

    let mut queued = Document::new();
    queued.insert(status.as_str(), JobStatus::Queued.to_string());

    let mut retryable = Document::new();
    retryable.insert(status.as_str(), JobStatus::Failed.to_string());
    retryable.insert(retry_count.as_str(), doc! { "$lt": retry_limit as i64 });

    doc! { "$or": [queued, retryable] }
}

pub fn change_stream_pipeline(retry_limit: u32) -> Vec<Document> {
    vec![doc! { "$match": eligible_status_filter("fullDocument.", retry_limit) }]
}

/// Eligible records strictly older than `reference_id`
pub fn pending_before_filter(reference_id: ObjectId, retry_limit: u32) -> Document {
    let mut filter = doc! { "_id": { "$lt": reference_id } };
    filter.extend(eligible_status_filter("", retry_limit));
    filter
}

pub fn count_pending_before_pipeline(reference_id: ObjectId, retry_limit: u32) -> Vec<Document> {
    vec![
        doc! { "$match": pending_before_filter(reference_id, retry_limit) },
        doc! { "$group": { "_id": null, "count": { "$sum": 1 } } },
    ]
}

pub fn catchup_sort(order: CatchupOrder) -> Document {
    match order {
        CatchupOrder::CreatedAt => doc! { "createdAt": 1, "_id": 1 },
        CatchupOrder::Identifier => doc! { "_id": 1 },
    }
}

/// Status guard for the `completed` transition: a record is completed at most once
pub fn not_completed_filter(id: ObjectId) -> Document {
    doc! { "_id": id, "status": { "$ne": JobStatus::Completed.to_string() } }
}

pub fn latest_resume_position_pipeline() -> Vec<Document> {
    vec![
        doc! { "$match": { "status": JobStatus::Completed.to_string(), "resumeToken": { "$exists": true, "$ne": null } } },
        doc! { "$sort": { "completedAt": -1 } },
        doc! { "$limit": 1 },
        doc! { "$project": { "_id": 0, "resumeToken": 1 } },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::Bson;

    #[test]
    fn change_stream_matches_on_full_document() {
        let pipeline = change_stream_pipeline(2);
        assert_eq!(pipeline.len(), 1);
        assert_eq!(
            pipeline[0],
            doc! {
                "$match": {
                    "$or": [
                        { "fullDocument.status": "queued" },
                        { "fullDocument.status": "failed", "fullDocument.retryCount": { "$lt": 2_i64 } },
                    ]
                }
            }
        );
    }

    #[test]
    fn pending_before_is_strictly_older_and_eligible() {
        let reference = ObjectId::from_bytes([0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 100]);
        let filter = pending_before_filter(reference, 2);

        assert_eq!(filter.get_document("_id").unwrap(), &doc! { "$lt": reference });
        let branches = filter.get_array("$or").unwrap();
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0], Bson::Document(doc! { "status": "queued" }));
        assert_eq!(branches[1], Bson::Document(doc! { "status": "failed", "retryCount": { "$lt": 2_i64 } }));
    }

    #[test]
    fn count_pipeline_groups_into_single_count() {
        let reference = ObjectId::new();
        let pipeline = count_pending_before_pipeline(reference, 2);
        assert_eq!(pipeline[1], doc! { "$group": { "_id": null, "count": { "$sum": 1 } } });
    }

    #[test]
    fn catchup_sort_follows_configured_order() {
        assert_eq!(catchup_sort(CatchupOrder::CreatedAt), doc! { "createdAt": 1, "_id": 1 });
        assert_eq!(catchup_sort(CatchupOrder::Identifier), doc! { "_id": 1 });
    }

    #[test]
    fn completion_guard_excludes_completed_records() {
        let id = ObjectId::new();
        assert_eq!(not_completed_filter(id), doc! { "_id": id, "status": { "$ne": "completed" } });
    }
}

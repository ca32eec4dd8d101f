use crate::core::config::Config;
use crate::error::job::JobError;
use crate::types::jobs::change_event::{JobChangeEvent, ResumePosition};
use crate::types::jobs::job_updates::JobItemUpdates;
use crate::types::jobs::types::RetrySource;
use crate::worker::catchup::{CatchupRequest, CatchupTrigger};
use mongodb::bson::oid::ObjectId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// What happened to a single claim attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This attempt moved the record to `completed`
    Completed,
    /// The lock was ours but the record was already `completed` (or is gone)
    AlreadyCompleted,
    /// Another worker holds the record's lock
    Contended,
}

/// Result of handling one live change event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventOutcome {
    pub claim: ClaimOutcome,
    /// Eligible records older than the event's record at the time of the check
    pub pending_before: u64,
}

pub struct JobHandlerService;

impl JobHandlerService {
    /// claim_and_complete - Claim a record, run the processor on it and mark it `completed`
    ///
    /// Shared by the live event path and the catch-up scanner. The write is guarded on the
    /// record not being `completed` yet, so completion happens at most once per record.
    ///
    /// # Arguments
    /// * `config` - Shared configuration
    /// * `job_id` - The record to claim
    /// * `resume_position` - Feed position to persist, for live events
    /// * `retry_source` - Provenance tag, for catch-up completions
    /// # Returns
    /// * `ClaimOutcome` - Lock contention is an outcome here, not an error
    /// # Errors
    /// * `JobError` - Lock store, database or processor failure
    #[tracing::instrument(skip_all, fields(job_id = %job_id, retry_source = ?retry_source))]
    pub async fn claim_and_complete(
        config: Arc<Config>,
        job_id: ObjectId,
        resume_position: Option<ResumePosition>,
        retry_source: Option<RetrySource>,
    ) -> Result<ClaimOutcome, JobError> {
        let params = config.service_config();
        let database = config.database().clone();
        let processor = config.processor().clone();

        let result = config
            .lock_service()
            .run_exclusively(&params.lock_namespace, &job_id.to_hex(), params.lock_ttl, true, move || async move {
                processor.process(job_id).await?;
                let update = JobItemUpdates::completion(resume_position, retry_source).build()?;
                Ok::<_, JobError>(database.complete_job(job_id, update).await?)
            })
            .await;

        match result {
            Ok(update) if update.modified_count > 0 => {
                info!(job_id = %job_id, retry_source = ?retry_source, "Job completed");
                Ok(ClaimOutcome::Completed)
            }
            Ok(_) => {
                debug!(job_id = %job_id, "Job already completed, nothing to do");
                Ok(ClaimOutcome::AlreadyCompleted)
            }
            Err(e) if e.is_lock_contention() => {
                debug!(job_id = %job_id, "Job is being handled by another worker, skipping");
                Ok(ClaimOutcome::Contended)
            }
            Err(e) => Err(e),
        }
    }

    /// handle_event - Handle one change event from the feed
    ///
    /// Completes the event's record, then checks whether older eligible records exist and,
    /// if so, asks the catch-up scanner to look at everything before this record. The check
    /// runs whatever happened to the claim, and a claim error is returned only afterwards.
    ///
    /// # Arguments
    /// * `config` - Shared configuration
    /// * `event` - The record identifier and feed position of the event
    /// * `catchup` - Sender side of the catch-up channel
    pub async fn handle_event(
        config: Arc<Config>,
        event: JobChangeEvent,
        catchup: &mpsc::Sender<CatchupRequest>,
    ) -> Result<EventOutcome, JobError> {
        let job_id = event.document_id;
        let claim =
            Self::claim_and_complete(config.clone(), job_id, Some(event.resume_position), None).await;
        if let Err(e) = &claim {
            error!(job_id = %job_id, error = %e, "Failed to complete job from change event");
        }

        let retry_limit = config.service_config().retry_limit;
        let pending_before = config.database().count_pending_jobs_before(job_id, retry_limit).await?;
        if pending_before > 0 {
            debug!(job_id = %job_id, pending_before, "Older eligible jobs found, requesting catch-up");
            catchup
                .send(CatchupRequest { reference_id: job_id, trigger: CatchupTrigger::LiveEvent })
                .await
                .map_err(|e| JobError::CatchupRequestFailed(e.to_string()))?;
        }

        Ok(EventOutcome { claim: claim?, pending_before })
    }
}

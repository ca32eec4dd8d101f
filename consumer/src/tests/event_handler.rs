use crate::core::client::database::{DatabaseError, MockDatabaseClient, UpdateResult};
use crate::core::client::lock::LockHandle;
use crate::error::job::JobError;
use crate::tests::common::{build_config, change_event, object_id, resume_position, test_params, InMemoryLockClient};
use crate::types::jobs::types::{JobStatus, RetrySource};
use crate::worker::catchup::{catchup_channel, CatchupRequest, CatchupTrigger};
use crate::worker::event_handler::service::{ClaimOutcome, EventOutcome, JobHandlerService};
use crate::worker::processor::{MockJobProcessor, NoopJobProcessor};
use assert_matches::assert_matches;
use rstest::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;

fn modified(count: u64) -> UpdateResult {
    UpdateResult { matched_count: count, modified_count: count }
}

#[fixture]
fn locks() -> Arc<InMemoryLockClient> {
    Arc::new(InMemoryLockClient::default())
}

#[rstest]
#[tokio::test]
async fn live_event_completes_record_with_resume_token(locks: Arc<InMemoryLockClient>) {
    let id = object_id(100);
    let mut database = MockDatabaseClient::new();
    database
        .expect_complete_job()
        .withf(move |job_id, update| {
            *job_id == id
                && update.status == Some(JobStatus::Completed)
                && update.completed_at.is_some()
                && update.resume_token == Some(resume_position(100))
                && update.retry_source.is_none()
        })
        .times(1)
        .returning(|_, _| Ok(modified(1)));
    database.expect_count_pending_jobs_before().withf(move |reference, limit| *reference == id && *limit == 2).times(1).returning(|_, _| Ok(0));

    let config = build_config(Arc::new(database), locks.clone(), Arc::new(NoopJobProcessor), test_params());
    let (sender, mut receiver) = catchup_channel(4);

    let outcome = JobHandlerService::handle_event(config, change_event(100), &sender).await.unwrap();

    assert_eq!(outcome, EventOutcome { claim: ClaimOutcome::Completed, pending_before: 0 });
    assert_eq!(receiver.try_recv(), Err(TryRecvError::Empty));
    assert_eq!(locks.acquired(), vec![LockHandle::key_for("handleEvents", &id.to_hex())]);
    assert!(!locks.is_held(&LockHandle::key_for("handleEvents", &id.to_hex())));
}

#[rstest]
#[tokio::test]
async fn older_pending_records_trigger_catchup_message(locks: Arc<InMemoryLockClient>) {
    let mut database = MockDatabaseClient::new();
    database.expect_complete_job().times(1).returning(|_, _| Ok(modified(1)));
    database.expect_count_pending_jobs_before().times(1).returning(|_, _| Ok(2));
    database.expect_get_pending_job_ids_before().never();

    let config = build_config(Arc::new(database), locks, Arc::new(NoopJobProcessor), test_params());
    let (sender, mut receiver) = catchup_channel(4);

    let outcome = JobHandlerService::handle_event(config, change_event(100), &sender).await.unwrap();

    assert_eq!(outcome.pending_before, 2);
    assert_eq!(
        receiver.try_recv().unwrap(),
        CatchupRequest { reference_id: object_id(100), trigger: CatchupTrigger::LiveEvent }
    );
}

#[rstest]
#[tokio::test]
async fn contended_record_is_skipped_but_still_checked_for_older_work(locks: Arc<InMemoryLockClient>) {
    let id = object_id(100);
    locks.hold(&LockHandle::key_for("handleEvents", &id.to_hex()), Duration::from_secs(60));

    let mut database = MockDatabaseClient::new();
    database.expect_complete_job().never();
    database.expect_count_pending_jobs_before().times(1).returning(|_, _| Ok(0));

    let config = build_config(Arc::new(database), locks, Arc::new(NoopJobProcessor), test_params());
    let (sender, _receiver) = catchup_channel(4);

    let outcome = JobHandlerService::handle_event(config, change_event(100), &sender).await.unwrap();
    assert_eq!(outcome.claim, ClaimOutcome::Contended);
}

#[rstest]
#[tokio::test]
async fn processor_failure_leaves_record_untouched_and_releases_lock(locks: Arc<InMemoryLockClient>) {
    let id = object_id(100);
    let mut processor = MockJobProcessor::new();
    processor
        .expect_process()
        .times(1)
        .returning(|job_id| Err(JobError::ProcessingFailed { job_id, reason: "boom".to_string() }));

    let mut database = MockDatabaseClient::new();
    database.expect_complete_job().never();
    database.expect_count_pending_jobs_before().times(1).returning(|_, _| Ok(0));

    let config = build_config(Arc::new(database), locks.clone(), Arc::new(processor), test_params());
    let (sender, _receiver) = catchup_channel(4);

    let result = JobHandlerService::handle_event(config, change_event(100), &sender).await;

    assert_matches!(result, Err(JobError::ProcessingFailed { job_id, .. }) if job_id == id);
    assert!(!locks.is_held(&LockHandle::key_for("handleEvents", &id.to_hex())));
}

#[rstest]
#[tokio::test]
async fn already_completed_record_is_a_no_op(locks: Arc<InMemoryLockClient>) {
    let mut database = MockDatabaseClient::new();
    database.expect_complete_job().times(1).returning(|_, _| Ok(modified(0)));

    let config = build_config(Arc::new(database), locks, Arc::new(NoopJobProcessor), test_params());
    let outcome = JobHandlerService::claim_and_complete(config, object_id(90), None, Some(RetrySource::InitiateOld))
        .await
        .unwrap();

    assert_eq!(outcome, ClaimOutcome::AlreadyCompleted);
}

#[rstest]
#[tokio::test]
async fn database_failure_is_reported_after_catchup_check(locks: Arc<InMemoryLockClient>) {
    let mut database = MockDatabaseClient::new();
    database
        .expect_complete_job()
        .times(1)
        .returning(|_, _| Err(DatabaseError::NoUpdateFound("simulated".to_string())));
    database.expect_count_pending_jobs_before().times(1).returning(|_, _| Ok(1));

    let config = build_config(Arc::new(database), locks, Arc::new(NoopJobProcessor), test_params());
    let (sender, mut receiver) = catchup_channel(4);

    let result = JobHandlerService::handle_event(config, change_event(100), &sender).await;

    assert_matches!(result, Err(JobError::DatabaseError(DatabaseError::NoUpdateFound(_))));
    assert!(receiver.try_recv().is_ok());
}

#[rstest]
#[tokio::test]
async fn closed_catchup_channel_is_an_error(locks: Arc<InMemoryLockClient>) {
    let mut database = MockDatabaseClient::new();
    database.expect_complete_job().returning(|_, _| Ok(modified(1)));
    database.expect_count_pending_jobs_before().returning(|_, _| Ok(3));

    let config = build_config(Arc::new(database), locks, Arc::new(NoopJobProcessor), test_params());
    let (sender, receiver) = catchup_channel(4);
    drop(receiver);

    let result = JobHandlerService::handle_event(config, change_event(100), &sender).await;
    assert_matches!(result, Err(JobError::CatchupRequestFailed(_)));
}

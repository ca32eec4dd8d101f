use crate::core::client::database::{DatabaseClient, DatabaseError, JobChangeStream, UpdateResult};
use crate::core::client::lock::error::LockError;
use crate::core::client::lock::{LockClient, LockResult};
use crate::core::config::Config;
use crate::error::job::JobError;
use crate::types::jobs::change_event::{JobChangeEvent, ResumePosition};
use crate::types::jobs::job_item::JobItem;
use crate::types::jobs::job_updates::JobItemUpdates;
use crate::types::jobs::types::{CatchupOrder, JobStatus};
use crate::types::params::ServiceParams;
use crate::worker::processor::{JobProcessor, NoopJobProcessor};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, DateTime};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Identifier whose ordering follows `n`
pub fn object_id(n: u64) -> ObjectId {
    let mut bytes = [0u8; 12];
    bytes[4..].copy_from_slice(&n.to_be_bytes());
    ObjectId::from_bytes(bytes)
}

pub fn resume_position(n: u64) -> ResumePosition {
    ResumePosition::new(doc! { "_data": format!("8263{:016X}", n) })
}

pub fn change_event(n: u64) -> JobChangeEvent {
    JobChangeEvent { resume_position: resume_position(n), document_id: object_id(n) }
}

pub fn job(n: u64, status: JobStatus, retry_count: u32) -> JobItem {
    let mut job = JobItem::new(object_id(n), status, retry_count);
    job.created_at = Some(DateTime::from_millis(n as i64 * 1000));
    job
}

/// Feed that yields `items` and then stays open
pub fn open_feed(items: Vec<Result<JobChangeEvent, DatabaseError>>) -> JobChangeStream {
    stream::iter(items).chain(stream::pending()).boxed()
}

/// Feed that yields `items` and then ends, like a server closing the cursor
pub fn closing_feed(items: Vec<Result<JobChangeEvent, DatabaseError>>) -> JobChangeStream {
    stream::iter(items).boxed()
}

pub fn test_params() -> ServiceParams {
    ServiceParams {
        observation_window: Some(Duration::from_secs(5)),
        drain_timeout: Duration::from_secs(1),
        resume_from_last_completed: false,
        ..Default::default()
    }
}

pub fn build_config(
    database: Arc<dyn DatabaseClient>,
    lock: Arc<dyn LockClient>,
    processor: Arc<dyn JobProcessor>,
    params: ServiceParams,
) -> Arc<Config> {
    Arc::new(Config::new(params, database, lock, processor))
}

pub fn in_memory_config(store: Arc<InMemoryJobStore>, locks: Arc<InMemoryLockClient>, params: ServiceParams) -> Arc<Config> {
    build_config(store, locks, Arc::new(NoopJobProcessor), params)
}

/// Record store kept in memory, applying the same predicates as the MongoDB queries
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<BTreeMap<ObjectId, JobItem>>,
    feeds: Mutex<VecDeque<JobChangeStream>>,
    subscriptions: Mutex<Vec<Option<ResumePosition>>>,
    completions: Mutex<HashMap<ObjectId, usize>>,
}

impl InMemoryJobStore {
    pub fn with_jobs(jobs: impl IntoIterator<Item = JobItem>) -> Self {
        let store = Self::default();
        store.insert_jobs(jobs);
        store
    }

    pub fn insert_jobs(&self, jobs: impl IntoIterator<Item = JobItem>) {
        let mut stored = self.jobs.lock().unwrap();
        for job in jobs {
            stored.insert(job.id, job);
        }
    }

    /// Queue the stream handed out by the next `watch_jobs` call
    pub fn push_feed(&self, feed: JobChangeStream) {
        self.feeds.lock().unwrap().push_back(feed);
    }

    pub fn job(&self, id: ObjectId) -> JobItem {
        self.jobs.lock().unwrap().get(&id).cloned().expect("job exists")
    }

    /// Resume positions passed to each `watch_jobs` call, in order
    pub fn subscriptions(&self) -> Vec<Option<ResumePosition>> {
        self.subscriptions.lock().unwrap().clone()
    }

    /// How many times a record actually transitioned to `completed`
    pub fn completions(&self, id: ObjectId) -> usize {
        self.completions.lock().unwrap().get(&id).copied().unwrap_or(0)
    }

    fn pending_before(&self, reference_id: ObjectId, retry_limit: u32) -> Vec<JobItem> {
        self.jobs
            .lock()
            .unwrap()
            .values()
            .filter(|job| job.id < reference_id && job.is_eligible(retry_limit))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DatabaseClient for InMemoryJobStore {
    async fn watch_jobs(
        &self,
        _retry_limit: u32,
        resume_after: Option<ResumePosition>,
    ) -> Result<JobChangeStream, DatabaseError> {
        self.subscriptions.lock().unwrap().push(resume_after);
        Ok(self.feeds.lock().unwrap().pop_front().unwrap_or_else(|| open_feed(vec![])))
    }

    async fn complete_job(&self, id: ObjectId, update: JobItemUpdates) -> Result<UpdateResult, DatabaseError> {
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(UpdateResult { matched_count: 0, modified_count: 0 });
        };
        if job.status == JobStatus::Completed {
            return Ok(UpdateResult { matched_count: 0, modified_count: 0 });
        }

        if let Some(status) = update.status {
            job.status = status;
        }
        if let Some(completed_at) = update.completed_at {
            job.completed_at = Some(completed_at);
        }
        if let Some(resume_token) = update.resume_token {
            job.resume_token = Some(resume_token);
        }
        if let Some(retry_source) = update.retry_source {
            job.retry_source = Some(retry_source);
        }
        if job.status == JobStatus::Completed {
            *self.completions.lock().unwrap().entry(id).or_insert(0) += 1;
        }
        Ok(UpdateResult { matched_count: 1, modified_count: 1 })
    }

    async fn count_pending_jobs_before(&self, reference_id: ObjectId, retry_limit: u32) -> Result<u64, DatabaseError> {
        Ok(self.pending_before(reference_id, retry_limit).len() as u64)
    }

    async fn get_pending_job_ids_before(
        &self,
        reference_id: ObjectId,
        retry_limit: u32,
        order: CatchupOrder,
    ) -> Result<Vec<ObjectId>, DatabaseError> {
        let mut jobs = self.pending_before(reference_id, retry_limit);
        match order {
            CatchupOrder::CreatedAt => {
                jobs.sort_by_key(|job| (job.created_at.map(|at| at.timestamp_millis()), job.id))
            }
            CatchupOrder::Identifier => jobs.sort_by_key(|job| job.id),
        }
        Ok(jobs.into_iter().map(|job| job.id).collect())
    }

    async fn get_latest_resume_position(&self) -> Result<Option<ResumePosition>, DatabaseError> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|job| job.status == JobStatus::Completed && job.resume_token.is_some())
            .max_by_key(|job| job.completed_at.map(|at| at.timestamp_millis()))
            .and_then(|job| job.resume_token.clone()))
    }
}

/// Lock store with atomic create-if-absent and expiry on the tokio clock
#[derive(Default)]
pub struct InMemoryLockClient {
    keys: Mutex<HashMap<String, Instant>>,
    acquired: Mutex<Vec<String>>,
}

impl InMemoryLockClient {
    pub fn hold(&self, key: &str, ttl: Duration) {
        self.keys.lock().unwrap().insert(key.to_string(), Instant::now() + ttl);
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.keys.lock().unwrap().get(key).is_some_and(|expires_at| *expires_at > Instant::now())
    }

    /// Every key ever acquired, in order
    pub fn acquired(&self) -> Vec<String> {
        self.acquired.lock().unwrap().clone()
    }
}

#[async_trait]
impl LockClient for InMemoryLockClient {
    async fn acquire_lock_if_available(&self, key: &str, _value: &str, ttl: Duration) -> Result<LockResult, LockError> {
        let mut keys = self.keys.lock().unwrap();
        let now = Instant::now();
        if keys.get(key).is_some_and(|expires_at| *expires_at > now) {
            return Ok(LockResult::AlreadyHeld);
        }
        keys.insert(key.to_string(), now + ttl);
        self.acquired.lock().unwrap().push(key.to_string());
        Ok(LockResult::Acquired)
    }

    async fn release_lock(&self, key: &str) -> Result<LockResult, LockError> {
        match self.keys.lock().unwrap().remove(key) {
            Some(expires_at) if expires_at > Instant::now() => Ok(LockResult::Released),
            _ => Ok(LockResult::NotFound),
        }
    }
}

/// Processor that remembers the order it was called in and can be told to fail or stall
#[derive(Default)]
pub struct RecordingProcessor {
    calls: Mutex<Vec<ObjectId>>,
    active: AtomicUsize,
    peak: AtomicUsize,
    failing: HashSet<ObjectId>,
    delay: Option<Duration>,
}

impl RecordingProcessor {
    pub fn failing_on(ids: impl IntoIterator<Item = ObjectId>) -> Self {
        Self { failing: ids.into_iter().collect(), ..Default::default() }
    }

    pub fn stalling_for(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Default::default() }
    }

    pub fn calls(&self) -> Vec<ObjectId> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of `process` calls that were running at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobProcessor for RecordingProcessor {
    async fn process(&self, job_id: ObjectId) -> Result<(), JobError> {
        self.calls.lock().unwrap().push(job_id);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        if self.failing.contains(&job_id) {
            return Err(JobError::ProcessingFailed { job_id, reason: "simulated failure".to_string() });
        }
        Ok(())
    }
}

use crate::core::client::database::{DatabaseError, JobChangeStream};
use crate::core::config::Config;
use crate::error::event::{EventSystemError, EventSystemResult};
use crate::error::job::JobError;
use crate::types::jobs::change_event::{JobChangeEvent, ResumePosition};
use crate::worker::catchup::CatchupRequest;
use crate::worker::event_handler::service::{EventOutcome, JobHandlerService};
use futures::StreamExt;
use mongodb::bson::oid::ObjectId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Delay before opening a new subscription after a restart fault or the end of the stream
const RESUBSCRIBE_BACKOFF: Duration = Duration::from_secs(1);

/// Wait out the backoff. Returns false when shutdown was requested meanwhile.
async fn resubscribe_backoff(cancellation_token: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancellation_token.cancelled() => {
            info!("Shutdown signal received during resubscribe backoff");
            false
        }
        _ = tokio::time::sleep(RESUBSCRIBE_BACKOFF) => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ListenerState {
    Idle,
    Watching,
    Restarting,
    Stopped,
}

/// Summary handed back when the listener stops
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ListenerReport {
    pub events_dispatched: u64,
    pub restarts: u64,
    /// Records whose handler was still running when the drain timed out
    pub outstanding: Vec<ObjectId>,
}

type HandlerResult = (ObjectId, Result<EventOutcome, JobError>);

/// Identifiers with a running handler. An entry goes away when its guard is dropped,
/// which also happens if the handler panics.
#[derive(Clone, Default)]
struct InFlightSet(Arc<Mutex<HashMap<ObjectId, usize>>>);

struct InFlightGuard {
    set: InFlightSet,
    id: ObjectId,
}

impl InFlightSet {
    fn track(&self, id: ObjectId) -> InFlightGuard {
        let mut ids = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *ids.entry(id).or_insert(0) += 1;
        InFlightGuard { set: self.clone(), id }
    }

    fn snapshot(&self) -> Vec<ObjectId> {
        let ids = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut outstanding: Vec<ObjectId> = ids.keys().copied().collect();
        outstanding.sort();
        outstanding
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut ids = self.set.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(count) = ids.get_mut(&self.id) {
            *count -= 1;
            if *count == 0 {
                ids.remove(&self.id);
            }
        }
    }
}

/// Watches the change feed and dispatches each event to its own handler task
pub struct ChangeFeedListener {
    config: Arc<Config>,
    catchup: mpsc::Sender<CatchupRequest>,
    cancellation_token: CancellationToken,
    resume_after: Option<ResumePosition>,
    state: ListenerState,
}

impl ChangeFeedListener {
    pub fn new(
        config: Arc<Config>,
        catchup: mpsc::Sender<CatchupRequest>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self { config, catchup, cancellation_token, resume_after: None, state: ListenerState::Idle }
    }

    /// Start right after `position` instead of looking up the last completed record
    pub fn with_resume_position(mut self, position: Option<ResumePosition>) -> Self {
        self.resume_after = position;
        self
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    fn transition(&mut self, next: ListenerState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "Listener state change");
            self.state = next;
        }
    }

    async fn initial_position(&self) -> Option<ResumePosition> {
        if self.resume_after.is_some() {
            return self.resume_after.clone();
        }
        if !self.config.service_config().resume_from_last_completed {
            return None;
        }
        match self.config.database().get_latest_resume_position().await {
            Ok(Some(position)) => {
                info!("Resuming change stream after the last completed job");
                Some(position)
            }
            Ok(None) => {
                info!("No completed job carries a resume token, watching from now");
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to read the last resume token, watching from now");
                None
            }
        }
    }

    async fn subscribe(&self, resume_after: Option<ResumePosition>) -> EventSystemResult<JobChangeStream> {
        let retry_limit = self.config.service_config().retry_limit;
        self.config.database().watch_jobs(retry_limit, resume_after).await.map_err(EventSystemError::SubscriptionFailed)
    }

    fn dispatch(&self, tasks: &mut JoinSet<HandlerResult>, in_flight: &InFlightSet, event: JobChangeEvent) {
        let job_id = event.document_id;
        let guard = in_flight.track(job_id);
        let config = self.config.clone();
        let catchup = self.catchup.clone();
        let span = info_span!("job_event", component = "listener", job_id = %job_id);

        tasks.spawn(
            async move {
                let _guard = guard;
                let result = JobHandlerService::handle_event(config, event, &catchup).await;
                (job_id, result)
            }
            .instrument(span),
        );
    }

    fn handle_task_result(result: Result<HandlerResult, JoinError>) {
        match result {
            Ok((job_id, Ok(outcome))) => {
                debug!(job_id = %job_id, claim = ?outcome.claim, pending_before = outcome.pending_before, "Event handled");
            }
            Ok((job_id, Err(e))) => {
                error!(job_id = %job_id, error = %e, "Event handling failed");
            }
            Err(e) => {
                error!(error = %e, "Event handler task panicked or was cancelled");
            }
        }
    }

    /// run - Watch the feed until shutdown or until the observation window elapses
    ///
    /// Each event is handed to its own task; once `max_in_flight` tasks are running the feed
    /// is not read until one finishes. A history-lost or fatal fault reopens the subscription
    /// with no resume position, any other fault is logged and the subscription is kept. When
    /// the server ends the stream, a new one resumes after the last event seen. Both reopen
    /// paths wait a short backoff first, cut short by shutdown.
    ///
    /// On the way out the subscription is dropped first, then running handlers get up to the
    /// drain timeout to finish. Those still running are detached and reported.
    ///
    /// # Returns
    /// * `ListenerReport` - Counters and the identifiers left outstanding
    /// # Errors
    /// * `EventSystemError::SubscriptionFailed` - A subscription could not be opened. Handlers are drained first
    pub async fn run(&mut self) -> EventSystemResult<ListenerReport> {
        let params = self.config.service_config().clone();
        let mut report = ListenerReport::default();
        let mut tasks: JoinSet<HandlerResult> = JoinSet::new();
        let in_flight = InFlightSet::default();

        let window = async {
            match params.observation_window {
                Some(window) => tokio::time::sleep(window).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(window);

        let mut last_position = self.initial_position().await;
        info!(
            retry_limit = params.retry_limit,
            max_in_flight = params.max_in_flight,
            resuming = last_position.is_some(),
            "Starting change stream listener"
        );

        let mut stream = match self.subscribe(last_position.clone()).await {
            Ok(stream) => stream,
            Err(e) => {
                self.transition(ListenerState::Stopped);
                return Err(e);
            }
        };
        self.transition(ListenerState::Watching);

        let cancellation_token = self.cancellation_token.clone();
        let exit: EventSystemResult<()> = loop {
            tokio::select! {
                biased;

                _ = cancellation_token.cancelled() => {
                    info!("Shutdown signal received, closing change stream");
                    break Ok(());
                }

                _ = &mut window => {
                    info!("Observation window elapsed, closing change stream");
                    break Ok(());
                }

                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    Self::handle_task_result(result);
                }

                item = stream.next(), if tasks.len() < params.max_in_flight => {
                    match item {
                        Some(Ok(event)) => {
                            last_position = Some(event.resume_position.clone());
                            report.events_dispatched += 1;
                            self.dispatch(&mut tasks, &in_flight, event);
                            if tasks.len() >= params.max_in_flight {
                                warn!(active = tasks.len(), "Backpressure activated - waiting for handlers to complete");
                            }
                        }
                        Some(Err(DatabaseError::ChangeFeed(fault))) if fault.requires_restart() => {
                            warn!(fault = %fault.fault, error = %fault.message, "Change stream lost its position, restarting without resume token");
                            self.transition(ListenerState::Restarting);
                            last_position = None;
                            report.restarts += 1;
                            if !resubscribe_backoff(&cancellation_token).await {
                                break Ok(());
                            }
                            match self.subscribe(None).await {
                                Ok(fresh) => stream = fresh,
                                Err(e) => break Err(e),
                            }
                            self.transition(ListenerState::Watching);
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Change stream reported an error, keeping the subscription");
                        }
                        None => {
                            warn!("Change stream ended, re-subscribing after the last seen event");
                            self.transition(ListenerState::Restarting);
                            if !resubscribe_backoff(&cancellation_token).await {
                                break Ok(());
                            }
                            match self.subscribe(last_position.clone()).await {
                                Ok(fresh) => stream = fresh,
                                Err(e) => break Err(e),
                            }
                            self.transition(ListenerState::Watching);
                        }
                    }
                }
            }
        };

        drop(stream);
        self.transition(ListenerState::Stopped);
        report.outstanding = Self::drain(&mut tasks, &in_flight, params.drain_timeout).await;
        info!(
            events_dispatched = report.events_dispatched,
            restarts = report.restarts,
            outstanding = report.outstanding.len(),
            "Change stream listener stopped"
        );

        exit.map(|_| report)
    }

    async fn drain(tasks: &mut JoinSet<HandlerResult>, in_flight: &InFlightSet, timeout: Duration) -> Vec<ObjectId> {
        if tasks.is_empty() {
            return Vec::new();
        }
        info!(active = tasks.len(), timeout_secs = timeout.as_secs(), "Waiting for in-flight handlers");

        let drained = tokio::time::timeout(timeout, async {
            while let Some(result) = tasks.join_next().await {
                Self::handle_task_result(result);
            }
        })
        .await;

        if drained.is_ok() {
            return Vec::new();
        }

        let outstanding = in_flight.snapshot();
        warn!(
            count = outstanding.len(),
            job_ids = ?outstanding.iter().map(|id| id.to_hex()).collect::<Vec<_>>(),
            "Drain timed out, leaving handlers to finish in the background"
        );
        tasks.detach_all();
        outstanding
    }
}

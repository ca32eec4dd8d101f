use crate::core::config::Config;
use crate::error::event::{EventSystemError, EventSystemResult};
use crate::error::job::JobError;
use crate::types::jobs::types::RetrySource;
use crate::worker::event_handler::service::{ClaimOutcome, JobHandlerService};
use mongodb::bson::oid::ObjectId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// Identifier greater than or equal to every other one. A scan before it covers the whole collection.
pub fn sweep_reference_id() -> ObjectId {
    ObjectId::from_bytes([0xff; 12])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum CatchupTrigger {
    /// A live event found older eligible records
    LiveEvent,
    /// Periodic full sweep
    Sweep,
}

/// Ask for every eligible record older than `reference_id` to be completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchupRequest {
    pub reference_id: ObjectId,
    pub trigger: CatchupTrigger,
}

impl CatchupRequest {
    pub fn sweep() -> Self {
        Self { reference_id: sweep_reference_id(), trigger: CatchupTrigger::Sweep }
    }
}

pub fn catchup_channel(capacity: usize) -> (mpsc::Sender<CatchupRequest>, mpsc::Receiver<CatchupRequest>) {
    mpsc::channel(capacity)
}

type ClaimResult = (ObjectId, Result<ClaimOutcome, JobError>);

/// Tally of one scan
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub matched: usize,
    pub completed: usize,
    pub already_completed: usize,
    pub contended: usize,
    pub failed: usize,
}

impl ScanReport {
    fn record(&mut self, joined: Result<ClaimResult, JoinError>) {
        match joined {
            Ok((_, Ok(ClaimOutcome::Completed))) => self.completed += 1,
            Ok((_, Ok(ClaimOutcome::AlreadyCompleted))) => self.already_completed += 1,
            Ok((_, Ok(ClaimOutcome::Contended))) => self.contended += 1,
            Ok((job_id, Err(e))) => {
                self.failed += 1;
                error!(job_id = %job_id, error = %e, "Failed to complete job during catch-up");
            }
            Err(e) => {
                self.failed += 1;
                error!(error = %e, "Catch-up task panicked or was cancelled");
            }
        }
    }
}

/// Consumes catch-up requests one scan at a time
pub struct CatchupScanner {
    config: Arc<Config>,
    receiver: mpsc::Receiver<CatchupRequest>,
    cancellation_token: CancellationToken,
}

impl CatchupScanner {
    pub fn new(
        config: Arc<Config>,
        receiver: mpsc::Receiver<CatchupRequest>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self { config, receiver, cancellation_token }
    }

    /// run - Serve catch-up requests until shutdown or until every sender is gone
    ///
    /// Requests queued while a scan was running are folded into a single one with the
    /// highest reference id, since that scan covers all the others. Scan failures are
    /// logged and never stop the loop.
    pub async fn run(mut self) -> EventSystemResult<()> {
        info!("Starting catch-up scanner");
        loop {
            let request = tokio::select! {
                biased;

                _ = self.cancellation_token.cancelled() => {
                    info!("Shutdown signal received, stopping catch-up scanner");
                    break;
                }

                request = self.receiver.recv() => match request {
                    Some(request) => request,
                    None => {
                        info!("All catch-up senders dropped, stopping catch-up scanner");
                        break;
                    }
                },
            };

            let request = self.coalesce(request);
            let span = tracing::info_span!(
                "catchup_scan",
                component = "catchup",
                reference_id = %request.reference_id,
                trigger = %request.trigger
            );
            if let Err(e) = Self::scan(self.config.clone(), request).instrument(span).await {
                error!(reference_id = %request.reference_id, error = %e, "Catch-up scan failed");
            }
        }

        self.receiver.close();
        let mut dropped = 0usize;
        while self.receiver.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!(dropped, "Catch-up requests left unserved at shutdown");
        }
        Ok(())
    }

    fn coalesce(&mut self, first: CatchupRequest) -> CatchupRequest {
        let mut merged = first;
        let mut folded = 0usize;
        while let Ok(next) = self.receiver.try_recv() {
            folded += 1;
            if next.reference_id > merged.reference_id {
                merged = next;
            }
        }
        if folded > 0 {
            debug!(folded, reference_id = %merged.reference_id, "Coalesced queued catch-up requests");
        }
        merged
    }

    /// scan - Complete every eligible record older than the request's reference id
    ///
    /// Records are claimed in the configured order, at most `catchup_concurrency` at a time.
    /// Each one goes through the same claim path as a live event and is tagged `initiate_old`.
    /// One record failing never stops the others.
    ///
    /// # Errors
    /// * `EventSystemError::CatchupFailed` - The query itself failed. Per-record failures only show in the report
    pub async fn scan(config: Arc<Config>, request: CatchupRequest) -> EventSystemResult<ScanReport> {
        let params = config.service_config();
        let job_ids = config
            .database()
            .get_pending_job_ids_before(request.reference_id, params.retry_limit, params.catchup_order)
            .await
            .map_err(EventSystemError::CatchupFailed)?;

        let mut report = ScanReport { matched: job_ids.len(), ..Default::default() };
        if job_ids.is_empty() {
            debug!("No pending jobs before reference");
            return Ok(report);
        }
        info!(
            matched = job_ids.len(),
            order = %params.catchup_order,
            concurrency = params.catchup_concurrency,
            "Catching up on pending jobs"
        );

        let bound = params.catchup_concurrency.max(1);
        let mut tasks: JoinSet<ClaimResult> = JoinSet::new();
        for job_id in job_ids {
            while tasks.len() >= bound {
                if let Some(joined) = tasks.join_next().await {
                    report.record(joined);
                }
            }

            let config = config.clone();
            tasks.spawn(
                async move {
                    let outcome =
                        JobHandlerService::claim_and_complete(config, job_id, None, Some(RetrySource::InitiateOld))
                            .await;
                    (job_id, outcome)
                }
                .in_current_span(),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            report.record(joined);
        }

        info!(
            matched = report.matched,
            completed = report.completed,
            already_completed = report.already_completed,
            contended = report.contended,
            failed = report.failed,
            "Catch-up scan finished"
        );
        Ok(report)
    }
}

/// Submit a full sweep request every `interval`, starting right away, until shutdown
pub async fn run_sweep(sender: mpsc::Sender<CatchupRequest>, interval: Duration, cancellation_token: CancellationToken) {
    if interval.is_zero() {
        warn!("Sweep interval is zero, periodic sweep disabled");
        return;
    }
    info!(interval_secs = interval.as_secs(), "Starting periodic catch-up sweep");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = cancellation_token.cancelled() => break,

            _ = ticker.tick() => {
                // full channel means a scan is pending anyway
                match sender.try_send(CatchupRequest::sweep()) {
                    Ok(()) => debug!("Sweep requested"),
                    Err(mpsc::error::TrySendError::Full(_)) => debug!("Catch-up queue full, skipping sweep"),
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        warn!("Catch-up scanner is gone, stopping sweep");
                        break;
                    }
                }
            }
        }
    }
}

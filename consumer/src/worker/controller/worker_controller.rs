use crate::core::config::Config;
use crate::error::event::{EventSystemError, EventSystemResult};
use crate::worker::catchup::{catchup_channel, run_sweep, CatchupScanner};
use crate::worker::listener::{ChangeFeedListener, ListenerReport};

use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

struct WorkerHandles {
    listener: JoinHandle<EventSystemResult<ListenerReport>>,
    listener_token: CancellationToken,
    scanner: JoinHandle<EventSystemResult<()>>,
    sweep: Option<JoinHandle<()>>,
}

/// Owns the listener, the catch-up scanner and the optional sweep
#[derive(Clone)]
pub struct WorkerController {
    config: Arc<Config>,
    handles: Arc<Mutex<Option<WorkerHandles>>>,
    cancellation_token: CancellationToken,
}

impl WorkerController {
    /// new - Create a new WorkerController
    /// # Arguments
    /// * `config` - The configuration shared by every worker
    /// * `cancellation_token` - Token for coordinated shutdown
    pub fn new(config: Arc<Config>, cancellation_token: CancellationToken) -> Self {
        Self { config, handles: Arc::new(Mutex::new(None)), cancellation_token }
    }

    /// start - Spawn the workers in the background
    ///
    /// `stopped` is notified when the listener exits on its own, either because its observation
    /// window elapsed or because it failed, so the process can shut down.
    ///
    /// # Errors
    /// * `EventSystemError::AlreadyStarted` - `start` was called twice
    pub fn start(&self, stopped: Arc<Notify>) -> EventSystemResult<()> {
        let mut handles = self.handles.lock().map_err(|e| EventSystemError::MutexPoisonError(e.to_string()))?;
        if handles.is_some() {
            return Err(EventSystemError::AlreadyStarted);
        }

        let params = self.config.service_config();
        let (sender, receiver) = catchup_channel(params.catchup_channel_capacity);

        let scanner = CatchupScanner::new(self.config.clone(), receiver, self.cancellation_token.child_token());
        let scanner = tokio::spawn(scanner.run().instrument(info_span!("worker", component = "catchup")));

        let sweep = params.sweep_interval.map(|interval| {
            let sender = sender.clone();
            let token = self.cancellation_token.child_token();
            tokio::spawn(run_sweep(sender, interval, token).instrument(info_span!("worker", component = "sweep")))
        });

        let listener_token = self.cancellation_token.child_token();
        let mut listener = ChangeFeedListener::new(self.config.clone(), sender, listener_token.clone());
        let listener = tokio::spawn(
            async move {
                let result = listener.run().await;
                if let Err(e) = &result {
                    error!(error = %e, "🚨 Critical: change stream listener failed");
                }
                stopped.notify_one();
                result
            }
            .instrument(info_span!("worker", component = "listener")),
        );

        *handles = Some(WorkerHandles { listener, listener_token, scanner, sweep });
        info!(sweep_enabled = params.sweep_interval.is_some(), "Workers started");
        Ok(())
    }

    /// shutdown - Stop every worker and wait for them
    ///
    /// The listener goes first so that handlers it drains can still queue catch-up requests,
    /// then the scanner and the sweep are stopped.
    ///
    /// # Returns
    /// * `Option<ListenerReport>` - The listener's report, `None` if the workers were never started
    /// # Errors
    /// * `EventSystemError` - The listener failed or a worker task panicked
    pub async fn shutdown(&self) -> EventSystemResult<Option<ListenerReport>> {
        info!("Initiating WorkerController graceful shutdown");
        let handles = self.handles.lock().map_err(|e| EventSystemError::MutexPoisonError(e.to_string()))?.take();
        let Some(handles) = handles else {
            warn!("Workers were never started, nothing to shut down");
            return Ok(None);
        };

        handles.listener_token.cancel();
        let report = handles.listener.await?;

        self.cancellation_token.cancel();
        if let Some(sweep) = handles.sweep {
            sweep.await?;
        }
        handles.scanner.await??;

        let report = report?;
        if !report.outstanding.is_empty() {
            warn!(
                outstanding = report.outstanding.len(),
                "Some jobs were still being handled at shutdown, the next catch-up scan will pick them up if needed"
            );
        }
        info!("All workers stopped");
        Ok(Some(report))
    }
}

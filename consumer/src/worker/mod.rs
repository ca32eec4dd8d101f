pub mod catchup;
pub mod controller;
pub mod event_handler;
pub mod listener;
pub mod processor;

use controller::worker_controller::WorkerController;

use crate::{core::config::Config, ConsumerResult};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Initializes the workers with the provided configuration
///
/// Starts the change stream listener, the catch-up scanner and, when configured, the periodic
/// sweep in the background and returns the controller used to shut them down.
///
/// # Arguments
/// * `config` - The configuration for the workers
/// * `shutdown_token` - Cancels every worker when triggered
/// * `stopped` - Notified when the listener exits on its own
pub fn initialize_worker(
    config: Arc<Config>,
    shutdown_token: CancellationToken,
    stopped: Arc<Notify>,
) -> ConsumerResult<WorkerController> {
    info!("Initializing workers");
    let controller = WorkerController::new(config, shutdown_token);
    controller.start(stopped)?;
    info!("Workers initialized and started successfully");
    Ok(controller)
}

use changestream_consumer::cli::{Cli, Commands, RunCmd};
use changestream_consumer::core::config::Config;
use changestream_consumer::utils::logging::init_logging;
use changestream_consumer::utils::signal_handler::SignalHandler;
use changestream_consumer::worker::initialize_worker;
use changestream_consumer::{ConsumerError, ConsumerResult};
use clap::Parser as _;
use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Extra time on top of the handler drain for stopping the scanner and sweep
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();
    info!("Starting changestream consumer");
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run { run_command } => {
            info!("Executing run command with args: {:?}", run_command);
            if let Err(e) = run_consumer(run_command).await {
                error!(error = %e, error_chain = ?e, "Consumer exited with an error");
                std::process::exit(1);
            }
        }
    }
}

async fn run_consumer(run_cmd: &RunCmd) -> ConsumerResult<()> {
    let config = Arc::new(Config::from_run_cmd(run_cmd).await?);
    debug!("Configuration initialized");

    let mut signal_handler = SignalHandler::new();
    let shutdown_token = CancellationToken::new();
    let worker_controller =
        initialize_worker(config.clone(), shutdown_token.clone(), signal_handler.get_shutdown_trigger())?;

    signal_handler.wait_for_shutdown().await;

    let timeout = config.service_config().drain_timeout + SHUTDOWN_GRACE;
    let report = signal_handler
        .handle_graceful_shutdown(
            || async { worker_controller.shutdown().await.map_err(|e| anyhow::anyhow!(e)) },
            timeout,
        )
        .await
        .map_err(ConsumerError::from)?;

    if let Some(report) = report {
        if !report.outstanding.is_empty() {
            warn!(
                job_ids = ?report.outstanding.iter().map(|id| id.to_hex()).collect::<Vec<_>>(),
                "Jobs still in flight at exit"
            );
        }
        info!(events = report.events_dispatched, restarts = report.restarts, "Consumer stopped");
    }
    Ok(())
}

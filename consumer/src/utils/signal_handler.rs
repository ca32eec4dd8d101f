use anyhow::{bail, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// What ended the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ShutdownSignal {
    #[strum(serialize = "SIGTERM")]
    Terminate,
    #[strum(serialize = "SIGINT")]
    Interrupt,
    /// Like SIGTERM, but an overrunning drain ends the process instead of returning an error
    #[strum(serialize = "SIGQUIT")]
    Quit,
    /// The listener stopped on its own (window elapsed or failure)
    #[strum(serialize = "INTERNAL")]
    Internal,
}

fn register(kind: SignalKind, name: &str) -> Signal {
    signal(kind).unwrap_or_else(|e| panic!("Failed to register {name} handler: {e}"))
}

/// Waits for a process signal or for the workers to stop, then bounds the drain that follows
pub struct SignalHandler {
    received: Option<ShutdownSignal>,
    listener_stopped: Arc<Notify>,
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHandler {
    pub fn new() -> Self {
        Self { received: None, listener_stopped: Arc::new(Notify::new()) }
    }

    /// Handed to the worker controller, notified when the listener exits by itself
    pub fn get_shutdown_trigger(&self) -> Arc<Notify> {
        self.listener_stopped.clone()
    }

    pub async fn wait_for_shutdown(&mut self) -> ShutdownSignal {
        let mut sigterm = register(SignalKind::terminate(), "SIGTERM");
        let mut sigint = register(SignalKind::interrupt(), "SIGINT");
        let mut sigquit = register(SignalKind::quit(), "SIGQUIT");

        let received = tokio::select! {
            _ = sigterm.recv() => ShutdownSignal::Terminate,
            _ = sigint.recv() => ShutdownSignal::Interrupt,
            _ = sigquit.recv() => ShutdownSignal::Quit,
            _ = self.listener_stopped.notified() => ShutdownSignal::Internal,
        };
        self.received = Some(received);
        info!(signal = %received, "🛑 Stopping consumer");
        received
    }

    /// Run `shutdown_fn` for at most `timeout`.
    /// After SIGQUIT an overrun exits the process, otherwise it is reported as an error.
    pub async fn handle_graceful_shutdown<F, Fut, T>(&self, shutdown_fn: F, timeout: Duration) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let trigger = self.received.unwrap_or(ShutdownSignal::Interrupt);
        info!(trigger = %trigger, timeout_secs = timeout.as_secs(), "Draining workers");

        let Ok(outcome) = tokio::time::timeout(timeout, shutdown_fn()).await else {
            error!(timeout_secs = timeout.as_secs(), "Workers did not stop in time");
            if trigger == ShutdownSignal::Quit {
                warn!("SIGQUIT received, exiting without waiting further");
                std::process::exit(1);
            }
            bail!("Shutdown timeout exceeded");
        };

        match &outcome {
            Ok(_) => info!("✅ Workers stopped"),
            Err(e) => error!(error = %e, "Workers stopped with an error"),
        }
        outcome
    }
}

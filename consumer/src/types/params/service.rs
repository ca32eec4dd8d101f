use crate::cli::service::ServiceCliArgs;
use crate::error::ConsumerError;
use crate::types::constant::{
    DEFAULT_CATCHUP_CHANNEL_CAPACITY, DEFAULT_CATCHUP_CONCURRENCY, DEFAULT_DRAIN_TIMEOUT_SECS, DEFAULT_LOCK_TTL, DEFAULT_MAX_IN_FLIGHT,
    DEFAULT_RETRY_LIMIT, EVENT_HANDLER_LOCK_NAMESPACE,
};
use crate::types::jobs::types::CatchupOrder;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServiceParams {
    /// `failed` records are eligible while `retryCount < retry_limit`
    pub retry_limit: u32,
    pub catchup_order: CatchupOrder,
    pub catchup_channel_capacity: usize,
    /// Upper bound on records a single catch-up scan claims concurrently
    pub catchup_concurrency: usize,
    /// Upper bound on concurrently running event handlers
    pub max_in_flight: usize,
    /// When set, the listener closes its subscription after this long
    pub observation_window: Option<Duration>,
    pub drain_timeout: Duration,
    /// When set, a full catch-up scan is requested on this interval
    pub sweep_interval: Option<Duration>,
    pub resume_from_last_completed: bool,
    pub lock_namespace: String,
    pub lock_ttl: Duration,
}

impl Default for ServiceParams {
    fn default() -> Self {
        Self {
            retry_limit: DEFAULT_RETRY_LIMIT,
            catchup_order: CatchupOrder::default(),
            catchup_channel_capacity: DEFAULT_CATCHUP_CHANNEL_CAPACITY,
            catchup_concurrency: DEFAULT_CATCHUP_CONCURRENCY,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            observation_window: None,
            drain_timeout: Duration::from_secs(DEFAULT_DRAIN_TIMEOUT_SECS),
            sweep_interval: None,
            resume_from_last_completed: true,
            lock_namespace: EVENT_HANDLER_LOCK_NAMESPACE.to_string(),
            lock_ttl: DEFAULT_LOCK_TTL,
        }
    }
}

impl ServiceParams {
    pub fn validate(&self) -> Result<(), ConsumerError> {
        if self.retry_limit == 0 {
            return Err(ConsumerError::ConfigError("retry_limit must be at least 1".to_string()));
        }
        if self.max_in_flight == 0 {
            return Err(ConsumerError::ConfigError("max_in_flight must be greater than 0".to_string()));
        }
        if self.catchup_channel_capacity == 0 {
            return Err(ConsumerError::ConfigError("catchup_channel_capacity must be greater than 0".to_string()));
        }
        if self.catchup_concurrency == 0 {
            return Err(ConsumerError::ConfigError("catchup_concurrency must be greater than 0".to_string()));
        }
        if self.sweep_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(ConsumerError::ConfigError("sweep_interval must be greater than 0 when set".to_string()));
        }
        if self.lock_namespace.trim().is_empty() {
            return Err(ConsumerError::ConfigError("lock_namespace must not be empty".to_string()));
        }
        if self.lock_ttl.is_zero() {
            return Err(ConsumerError::ConfigError("lock_ttl must be greater than 0".to_string()));
        }
        Ok(())
    }
}

impl From<ServiceCliArgs> for ServiceParams {
    fn from(args: ServiceCliArgs) -> Self {
        Self {
            retry_limit: args.retry_limit,
            catchup_order: args.catchup_order,
            catchup_channel_capacity: args.catchup_channel_capacity,
            catchup_concurrency: args.catchup_concurrency,
            max_in_flight: args.max_in_flight,
            observation_window: args.observation_window_secs.map(Duration::from_secs),
            drain_timeout: Duration::from_secs(args.drain_timeout_secs),
            sweep_interval: args.sweep_interval_secs.map(Duration::from_secs),
            resume_from_last_completed: args.resume_from_last_completed,
            ..Default::default()
        }
    }
}

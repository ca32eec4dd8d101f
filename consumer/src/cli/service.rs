use crate::types::jobs::types::CatchupOrder;
use clap::Args;

fn parse_positive_usize(s: &str) -> Result<usize, String> {
    let value: usize = s.parse().map_err(|_| format!("'{}' is not a valid number", s))?;
    if value == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(value)
}

#[derive(Debug, Clone, Args)]
pub struct ServiceCliArgs {
    /// `failed` records are picked up again while their retry count is below this.
    #[arg(env = "CHANGESTREAM_RETRY_LIMIT", long, default_value = "2", value_parser = clap::value_parser!(u32).range(1..))]
    pub retry_limit: u32,

    /// Order of the first attempt over the records a catch-up scan finds.
    #[arg(env = "CHANGESTREAM_CATCHUP_ORDER", long, value_enum, default_value_t = CatchupOrder::CreatedAt)]
    pub catchup_order: CatchupOrder,

    /// Number of catch-up requests that can wait for the scanner. Must be greater than 0.
    #[arg(env = "CHANGESTREAM_CATCHUP_CHANNEL_CAPACITY", long, default_value = "64", value_parser = parse_positive_usize)]
    pub catchup_channel_capacity: usize,

    /// Maximum number of change events handled concurrently. Must be greater than 0.
    #[arg(env = "CHANGESTREAM_MAX_IN_FLIGHT", long, default_value = "128", value_parser = parse_positive_usize)]
    pub max_in_flight: usize,

    /// Maximum number of records a catch-up scan claims at the same time. Must be greater than 0.
    #[arg(env = "CHANGESTREAM_CATCHUP_CONCURRENCY", long, default_value = "16", value_parser = parse_positive_usize)]
    pub catchup_concurrency: usize,

    /// Close the subscription after this many seconds. Runs until shutdown when unset.
    #[arg(env = "CHANGESTREAM_OBSERVATION_WINDOW_SECS", long)]
    pub observation_window_secs: Option<u64>,

    /// How long in-flight handlers may take to finish once the listener closes.
    #[arg(env = "CHANGESTREAM_DRAIN_TIMEOUT_SECS", long, default_value = "30")]
    pub drain_timeout_secs: u64,

    /// Request a full catch-up scan on this interval. Disabled when unset, must be greater than 0 when set.
    #[arg(env = "CHANGESTREAM_SWEEP_INTERVAL_SECS", long, value_parser = clap::value_parser!(u64).range(1..))]
    pub sweep_interval_secs: Option<u64>,

    /// Resume the feed after the most recently completed record on start.
    #[arg(
        env = "CHANGESTREAM_RESUME_FROM_LAST_COMPLETED",
        long,
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub resume_from_last_completed: bool,
}

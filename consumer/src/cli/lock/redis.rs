use crate::types::constant::EVENT_HANDLER_LOCK_NAMESPACE;
use clap::Args;

/// Parameters used to config the Redis lock store.
#[derive(Debug, Clone, Args)]
pub struct RedisCliArgs {
    /// The connection string to the Redis server.
    #[arg(env = "CHANGESTREAM_REDIS_URL", long, default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Namespace prefixed to every record lock key (`{namespace}:{id}`).
    #[arg(env = "CHANGESTREAM_LOCK_NAMESPACE", long, default_value = EVENT_HANDLER_LOCK_NAMESPACE)]
    pub lock_namespace: String,

    /// Lifetime of a record lock in milliseconds.
    #[arg(env = "CHANGESTREAM_LOCK_TTL_MS", long, default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
    pub lock_ttl_ms: u64,
}

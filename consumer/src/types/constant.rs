use std::time::Duration;

/// Eligibility cut-off for `failed` records: a record with `retryCount >= DEFAULT_RETRY_LIMIT` is never picked up.
pub const DEFAULT_RETRY_LIMIT: u32 = 2;

/// Operation class used when the event path claims a record.
pub const EVENT_HANDLER_LOCK_NAMESPACE: &str = "handleEvents";

/// Handling window for one record. The token expires on its own after this.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_millis(1000);

/// Sentinel stored under every lock key. Only the existence of the key matters.
pub const LOCK_SENTINEL_VALUE: &str = "true";

pub const DEFAULT_CATCHUP_CHANNEL_CAPACITY: usize = 64;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 128;
pub const DEFAULT_CATCHUP_CONCURRENCY: usize = 16;
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_DATABASE_NAME: &str = "sample_airbnb";
pub const DEFAULT_COLLECTION_NAME: &str = "listingsAndReviews";

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    /// Waiting to be picked up for the first time
    Queued,
    /// The last attempt failed. Picked up again while `retryCount` is under the retry limit
    Failed,
    /// Terminal. Never selected again by the feed predicate or a catch-up scan
    Completed,
}

impl JobStatus {
    /// Whether a record in this status, with the given retry counter, should be processed
    pub fn is_eligible(&self, retry_count: u32, retry_limit: u32) -> bool {
        match self {
            JobStatus::Queued => true,
            JobStatus::Failed => retry_count < retry_limit,
            JobStatus::Completed => false,
        }
    }
}

/// Provenance tag written alongside a completion. Informational only.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum RetrySource {
    /// Completed by a catch-up scan rather than by a live change event
    #[serde(rename = "initiate_old")]
    #[strum(serialize = "initiate_old")]
    InitiateOld,
}

/// Order in which a catch-up scan makes its first attempt over the matched records.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, strum_macros::Display, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum CatchupOrder {
    /// `createdAt` ascending, ties broken by identifier
    #[default]
    CreatedAt,
    /// Identifier ascending, the same key the change feed is ordered by
    Identifier,
}

use mongodb::bson;
use mongodb::error::{Error as MongoError, ErrorKind};
use thiserror::Error;

/// Server error code names that invalidate the current subscription position.
pub const CHANGE_STREAM_HISTORY_LOST: &str = "ChangeStreamHistoryLost";
pub const CHANGE_STREAM_FATAL_ERROR: &str = "ChangeStreamFatalError";
const CHANGE_STREAM_HISTORY_LOST_CODE: i32 = 286;
const CHANGE_STREAM_FATAL_ERROR_CODE: i32 = 280;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Mongo error: {0}")]
    MongoError(#[from] MongoError),

    #[error("Failed to serialize document: {0}")]
    FailedToSerializeDocument(String),

    #[error("BSON serialization error: {0}")]
    BsonSerError(#[from] bson::ser::Error),

    #[error("BSON deserialization error: {0}")]
    BsonDeError(#[from] bson::de::Error),

    #[error("No update found: {0}")]
    NoUpdateFound(String),

    #[error("Key not found in document: {0}")]
    KeyNotFound(String),

    #[error("Malformed change event: {0}")]
    MalformedChangeEvent(String),

    #[error(transparent)]
    ChangeFeed(#[from] ChangeFeedError),
}

/// How the listener should react to a fault reported by the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum FeedFault {
    /// The resume position fell out of the oplog window
    HistoryLost,
    /// The server will not continue this stream
    Fatal,
    /// Anything else. Surfaced, never retried
    Other,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("change feed fault ({fault}): {message}")]
pub struct ChangeFeedError {
    pub fault: FeedFault,
    pub message: String,
}

impl ChangeFeedError {
    pub fn new(fault: FeedFault, message: impl Into<String>) -> Self {
        Self { fault, message: message.into() }
    }

    /// Classify a server-reported command failure by its code name, falling back to the numeric code.
    pub fn from_server_error(code: i32, code_name: &str, message: &str) -> Self {
        let fault = match (code_name, code) {
            (CHANGE_STREAM_HISTORY_LOST, _) | (_, CHANGE_STREAM_HISTORY_LOST_CODE) => FeedFault::HistoryLost,
            (CHANGE_STREAM_FATAL_ERROR, _) | (_, CHANGE_STREAM_FATAL_ERROR_CODE) => FeedFault::Fatal,
            _ => FeedFault::Other,
        };
        Self::new(fault, format!("{code_name} ({code}): {message}"))
    }

    /// Whether the subscription must be torn down and opened again without a resume position
    pub fn requires_restart(&self) -> bool {
        matches!(self.fault, FeedFault::HistoryLost | FeedFault::Fatal)
    }
}

impl From<&MongoError> for ChangeFeedError {
    fn from(error: &MongoError) -> Self {
        match error.kind.as_ref() {
            ErrorKind::Command(command) => Self::from_server_error(command.code, &command.code_name, &command.message),
            _ => Self::new(FeedFault::Other, error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(286, "ChangeStreamHistoryLost", FeedFault::HistoryLost)]
    #[case(280, "ChangeStreamFatalError", FeedFault::Fatal)]
    #[case(286, "", FeedFault::HistoryLost)]
    #[case(0, "ChangeStreamFatalError", FeedFault::Fatal)]
    #[case(11601, "Interrupted", FeedFault::Other)]
    #[case(13, "Unauthorized", FeedFault::Other)]
    fn server_errors_are_classified(#[case] code: i32, #[case] code_name: &str, #[case] expected: FeedFault) {
        let error = ChangeFeedError::from_server_error(code, code_name, "boom");
        assert_eq!(error.fault, expected);
        assert_eq!(error.requires_restart(), expected != FeedFault::Other);
    }
}

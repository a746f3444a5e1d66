use thiserror::Error;

/// Engine and configuration level errors.
///
/// Failures of individual actions never show up here: a dropped action is
/// reported through the `FailureObserver` and the logs, not through `run`.
#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("worker count must be at least 1 (got {0})")]
    InvalidWorkerCount(usize),

    #[error("mark_complete called more times than actions were enqueued")]
    CompletedTooManyTimes,

    #[error("failed to acquire http session: {0}")]
    Session(#[source] reqwest::Error),

    #[error("response handler not found: {0}")]
    HandlerNotFound(String),

    #[error("duplicate response handler: {0}")]
    DuplicateHandler(String),

    #[error("invalid http method: {0}")]
    InvalidMethod(String),

    #[error("invalid request option `{key}`: {reason}")]
    InvalidOption { key: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

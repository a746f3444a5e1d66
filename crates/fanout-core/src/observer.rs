//! Failure observer: an opt-in callback for drops and retries.
//!
//! Drops are always logged. Without an observer installed (`SilentObserver`)
//! that is the only trace a failed action leaves, same as before observers
//! existed. Callers that want to react to failures install their own
//! observer or a `CollectingObserver`.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::ids::ActionId;

/// Why an action was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// 503/504 with retries disabled for the action.
    TransientServerError { status: u16 },

    /// Retry budget spent. `last_status` is `None` when the last attempt
    /// failed at the transport level, or when nothing was attempted.
    RetryExhausted { last_status: Option<u16> },

    /// Any other non-200 status.
    PermanentHttpError { status: u16 },

    /// Connection, timeout or protocol failure; also malformed pass-through
    /// options.
    TransportError { message: String },

    /// A response handler returned an error; the rest of the chain was skipped.
    HandlerError { handler: String, message: String },

    /// An HTTP action ran on a worker without a session.
    NoSession,

    /// The action panicked while executing.
    Panicked { message: String },
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::TransientServerError { status } => {
                write!(f, "transient server error {status} (retry disabled)")
            }
            FailureKind::RetryExhausted {
                last_status: Some(status),
            } => write!(f, "retry budget exhausted (last status {status})"),
            FailureKind::RetryExhausted { last_status: None } => {
                write!(f, "retry budget exhausted")
            }
            FailureKind::PermanentHttpError { status } => write!(f, "http error {status}"),
            FailureKind::TransportError { message } => write!(f, "transport error: {message}"),
            FailureKind::HandlerError { handler, message } => {
                write!(f, "handler {handler} failed: {message}")
            }
            FailureKind::NoSession => write!(f, "no http session available"),
            FailureKind::Panicked { message } => write!(f, "action panicked: {message}"),
        }
    }
}

/// A dropped action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEvent {
    pub action_id: Option<ActionId>,
    pub action: String,
    pub retry_count: u32,
    pub kind: FailureKind,
}

/// An action put back on the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryEvent {
    pub action_id: ActionId,
    pub action: String,
    pub retry_count: u32,
    pub retry_limit: u32,
    pub reason: String,
}

pub trait FailureObserver: Send + Sync {
    /// Called once for every dropped action.
    fn on_failure(&self, event: &FailureEvent);

    /// Called every time an action is re-enqueued.
    fn on_retry(&self, _event: &RetryEvent) {}
}

/// Logs only; the default.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl FailureObserver for SilentObserver {
    fn on_failure(&self, _event: &FailureEvent) {}
}

/// Records every event it sees.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    failures: Mutex<Vec<FailureEvent>>,
    retries: Mutex<Vec<RetryEvent>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<FailureEvent> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn retries(&self) -> Vec<RetryEvent> {
        self.retries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl FailureObserver for CollectingObserver {
    fn on_failure(&self, event: &FailureEvent) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }

    fn on_retry(&self, event: &RetryEvent) {
        self.retries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

//! Action state machine.

use serde::{Deserialize, Serialize};

/// Action state.
///
/// State transitions:
/// - Pending -> InFlight -> Succeeded
/// - Pending -> InFlight -> Retrying -> Pending (loop while budget remains)
/// - Pending -> InFlight -> Dropped
/// - Pending -> Dropped (budget already spent when dequeued)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionState {
    /// Waiting in the queue.
    Pending,

    /// Request issued, response not yet handled.
    InFlight,

    /// Handler chain ran to completion.
    Succeeded,

    /// Transient failure; the action was put back on the queue.
    Retrying,

    /// Given up (permanent error, transport error, exhausted budget, ...).
    Dropped,
}

impl ActionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ActionState::Succeeded | ActionState::Dropped)
    }
}

/// Retry bookkeeping carried by an HTTP action.
///
/// `retry_count` counts issued attempts; it only grows and never exceeds the
/// limit it was started against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    pub state: ActionState,
    pub retry_count: u32,
    pub last_status: Option<u16>,
    pub last_error: Option<String>,
}

impl RetryState {
    pub fn new() -> Self {
        Self {
            state: ActionState::Pending,
            retry_count: 0,
            last_status: None,
            last_error: None,
        }
    }

    pub fn is_exhausted(&self, retry_limit: u32) -> bool {
        self.retry_count >= retry_limit
    }

    /// Mark as in flight (increment the attempt counter).
    pub fn start_attempt(&mut self) {
        self.state = ActionState::InFlight;
        self.retry_count += 1;
    }

    pub fn record_status(&mut self, status: u16) {
        self.last_status = Some(status);
    }

    pub fn mark_succeeded(&mut self) {
        self.state = ActionState::Succeeded;
    }

    pub fn mark_retrying(&mut self, error: String) {
        self.state = ActionState::Retrying;
        self.last_error = Some(error);
    }

    /// Move from Retrying back to Pending, right before re-enqueueing.
    pub fn requeue(&mut self) {
        self.state = ActionState::Pending;
    }

    pub fn mark_dropped(&mut self, error: String) {
        self.state = ActionState::Dropped;
        self.last_error = Some(error);
    }
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

//! Queue module: the work list, action state machine and retry decisions.

mod retry;
mod state;

pub use retry::{AttemptResult, Decision, RetryPolicy};
pub use state::{ActionState, RetryState};

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::action::Action;
use crate::error::FanoutError;

/// Snapshot of the queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// Actions waiting to be dequeued.
    pub pending: usize,
    /// `enqueued_total - completed_total`.
    pub outstanding: u64,
    pub enqueued_total: u64,
    pub completed_total: u64,
}

struct QueueState {
    pending: VecDeque<Box<dyn Action>>,
    enqueued_total: u64,
    completed_total: u64,
}

impl QueueState {
    fn outstanding(&self) -> u64 {
        self.enqueued_total - self.completed_total
    }
}

struct QueueInner {
    state: Mutex<QueueState>,
    /// Signalled on every enqueue.
    available: Notify,
    /// Signalled when outstanding drops to zero.
    drained: Notify,
}

/// Unbounded FIFO work list with completion counting.
///
/// Every `enqueue` must be matched by exactly one `mark_complete`; `join`
/// waits for the live outstanding count to reach zero, so actions enqueued
/// while someone is already joining are waited for as well.
///
/// The handle is cheap to clone; all clones share one queue.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    enqueued_total: 0,
                    completed_total: 0,
                }),
                available: Notify::new(),
                drained: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an action. Never blocks, never fails.
    pub fn enqueue(&self, action: Box<dyn Action>) {
        {
            let mut state = self.lock();
            state.pending.push_back(action);
            state.enqueued_total += 1;
        }
        self.inner.available.notify_one();
    }

    /// Take the next action, waiting until one is available.
    pub async fn dequeue(&self) -> Box<dyn Action> {
        loop {
            // Register before looking, otherwise an enqueue between the
            // check and the await could be missed.
            let notified = self.inner.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next = self.lock().pending.pop_front();
            if let Some(action) = next {
                return action;
            }
            notified.await;
        }
    }

    /// Non-blocking variant of `dequeue`.
    pub fn try_dequeue(&self) -> Option<Box<dyn Action>> {
        self.lock().pending.pop_front()
    }

    /// Record that one previously dequeued action reached a terminal point.
    pub fn mark_complete(&self) -> Result<(), FanoutError> {
        let drained = {
            let mut state = self.lock();
            if state.completed_total >= state.enqueued_total {
                return Err(FanoutError::CompletedTooManyTimes);
            }
            state.completed_total += 1;
            state.outstanding() == 0
        };
        if drained {
            self.inner.drained.notify_waiters();
        }
        Ok(())
    }

    /// Wait until every enqueued action has been marked complete.
    pub async fn join(&self) {
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let outstanding = self.lock().outstanding();
            if outstanding == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn outstanding(&self) -> u64 {
        self.lock().outstanding()
    }

    pub fn counts(&self) -> QueueCounts {
        let state = self.lock();
        QueueCounts {
            pending: state.pending.len(),
            outstanding: state.outstanding(),
            enqueued_total: state.enqueued_total,
            completed_total: state.completed_total,
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("counts", &self.counts())
            .finish()
    }
}

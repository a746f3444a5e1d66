//! Actions: units of work a worker pulls off the queue and executes.
//!
//! - `SleepAction` / `FnAction`: self-contained work.
//! - `HttpAction`: one request with retry state and a response handler chain.

mod generic;
mod http;

pub use generic::{FnAction, SleepAction};
pub use http::{HttpAction, HttpActionBuilder};

use std::sync::Arc;

use async_trait::async_trait;

use crate::observer::{FailureEvent, FailureObserver};
use crate::queue::{ActionState, TaskQueue};
use crate::session::Session;

/// A unit of work.
///
/// `execute` consumes the box: an action that wants another go (retry)
/// simply enqueues itself again through `env.queue()`.
#[async_trait]
pub trait Action: Send + 'static {
    fn name(&self) -> &str;

    /// Run the action. The returned state is where the action ended up
    /// (`Succeeded`, `Retrying` or `Dropped`).
    async fn execute(self: Box<Self>, env: &WorkerEnv) -> ActionState;

    fn boxed(self) -> Box<dyn Action>
    where
        Self: Sized,
    {
        Box::new(self)
    }
}

/// What a worker hands to every action it executes.
#[derive(Clone)]
pub struct WorkerEnv {
    worker_id: usize,
    queue: TaskQueue,
    session: Option<Arc<Session>>,
    observer: Arc<dyn FailureObserver>,
}

impl WorkerEnv {
    pub fn new(
        queue: TaskQueue,
        session: Option<Arc<Session>>,
        observer: Arc<dyn FailureObserver>,
    ) -> Self {
        Self {
            worker_id: 0,
            queue,
            session,
            observer,
        }
    }

    pub fn with_worker_id(mut self, worker_id: usize) -> Self {
        self.worker_id = worker_id;
        self
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_deref()
    }

    pub fn observer(&self) -> &dyn FailureObserver {
        self.observer.as_ref()
    }

    pub fn report_failure(&self, event: FailureEvent) {
        self.observer.on_failure(&event);
    }
}

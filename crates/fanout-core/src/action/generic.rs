//! Self-contained actions that need no HTTP session.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::debug;

use super::{Action, WorkerEnv};
use crate::context::{keys, Context};
use crate::queue::{ActionState, TaskQueue};

const DEFAULT_MIN_SLEEP: Duration = Duration::from_millis(50);
const DEFAULT_MAX_SLEEP: Duration = Duration::from_millis(1_000);

/// Sleeps for a random interval, then records a completion message in
/// `context["result"]`.
#[derive(Debug, Clone)]
pub struct SleepAction {
    name: String,
    context: Context,
    min_sleep: Duration,
    max_sleep: Duration,
}

impl SleepAction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            context: Context::new(),
            min_sleep: DEFAULT_MIN_SLEEP,
            max_sleep: DEFAULT_MAX_SLEEP,
        }
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Bounds are swapped if given in the wrong order.
    pub fn with_sleep_range(mut self, min: Duration, max: Duration) -> Self {
        self.min_sleep = min.min(max);
        self.max_sleep = min.max(max);
        self
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    fn pick_sleep(&self) -> Duration {
        let min = self.min_sleep.as_micros() as u64;
        let max = self.max_sleep.as_micros() as u64;
        // ThreadRng is !Send, keep it out of the async body
        let micros = rand::thread_rng().gen_range(min..=max);
        Duration::from_micros(micros)
    }
}

#[async_trait]
impl Action for SleepAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(self: Box<Self>, env: &WorkerEnv) -> ActionState {
        let slept = self.pick_sleep();
        tokio::time::sleep(slept).await;

        let message = format!(
            "{} Action Completed. Slept for {:.3}",
            self.name,
            slept.as_secs_f64()
        );
        debug!(worker_id = env.worker_id(), action = %self.name, "{message}");
        self.context.insert(keys::RESULT, message);
        ActionState::Succeeded
    }
}

/// Wraps an async closure. The closure receives the action's context and
/// the queue, so it can enqueue follow-up work.
pub struct FnAction<F> {
    name: String,
    context: Context,
    f: F,
}

impl<F, Fut> FnAction<F>
where
    F: Fn(Context, TaskQueue) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    pub fn new(name: impl Into<String>, context: Context, f: F) -> Self {
        Self {
            name: name.into(),
            context,
            f,
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }
}

#[async_trait]
impl<F, Fut> Action for FnAction<F>
where
    F: Fn(Context, TaskQueue) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(self: Box<Self>, env: &WorkerEnv) -> ActionState {
        (self.f)(self.context.clone(), env.queue().clone()).await;
        ActionState::Succeeded
    }
}

//! Runs a batch of seed actions to completion on a bounded worker pool.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::action::{Action, WorkerEnv};
use crate::config::RunnerConfig;
use crate::error::FanoutError;
use crate::observer::{FailureObserver, SilentObserver};
use crate::queue::TaskQueue;
use crate::session::Session;
use crate::worker::WorkerGroup;

/// Which flavour of run: plain actions only, or HTTP actions sharing one
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Generic,
    Http,
}

/// Entry point: seeds a fresh queue, runs `workers` workers until every
/// action (including fanned-out and retried ones) has completed, then shuts
/// the workers down.
///
/// A failed action never fails the run; only setup problems (zero workers,
/// session construction) are returned as errors.
pub struct Runner {
    config: RunnerConfig,
    mode: Mode,
    observer: Arc<dyn FailureObserver>,
}

impl Runner {
    /// Runner for actions that need no HTTP session.
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            mode: Mode::Generic,
            observer: Arc::new(SilentObserver),
        }
    }

    /// Runner that opens one HTTP session for the whole run.
    pub fn http(config: RunnerConfig) -> Self {
        Self {
            mode: Mode::Http,
            ..Self::new(config)
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn FailureObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub async fn run_with_default_workers(
        &self,
        actions: impl IntoIterator<Item = Box<dyn Action>>,
    ) -> Result<(), FanoutError> {
        self.run(actions, self.config.workers).await
    }

    pub async fn run(
        &self,
        actions: impl IntoIterator<Item = Box<dyn Action>>,
        workers: usize,
    ) -> Result<(), FanoutError> {
        if workers == 0 {
            return Err(FanoutError::InvalidWorkerCount(workers));
        }
        let started = Instant::now();

        let queue = TaskQueue::new();
        let session = match self.mode {
            Mode::Http => {
                let session = Session::acquire(&self.config.session)?;
                debug!("http session acquired");
                Some(Arc::new(session))
            }
            Mode::Generic => None,
        };

        let env = WorkerEnv::new(queue.clone(), session.clone(), Arc::clone(&self.observer));
        let group = WorkerGroup::spawn(workers, env);

        let mut seeded = 0usize;
        for action in actions {
            queue.enqueue(action);
            seeded += 1;
        }
        info!(workers, seeded, http = self.mode == Mode::Http, "run started");

        queue.join().await;
        group.shutdown_and_join(self.config.shutdown_grace()).await;

        if let Some(session) = session {
            drop(session);
            debug!("http session closed");
        }

        let counts = queue.counts();
        info!(
            seeded,
            executed = counts.completed_total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "run finished"
        );
        Ok(())
    }
}

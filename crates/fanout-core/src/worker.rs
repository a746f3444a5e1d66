use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::action::{Action, WorkerEnv};
use crate::observer::{FailureEvent, FailureKind};

/// Worker group handle.
/// - `shutdown_tx` に true を送るとワーカーは新しい action を取らなくなる
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
/// - handle を drop すると JoinSet が残りのワーカーを abort する
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: JoinSet<()>,
}

impl WorkerGroup {
    /// Spawn `n` workers sharing `env` (queue, session, observer).
    pub fn spawn(n: usize, env: WorkerEnv) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = JoinSet::new();
        for worker_id in 0..n {
            let env = env.clone().with_worker_id(worker_id);
            let rx = shutdown_rx.clone();
            joins.spawn(worker_loop(env, rx));
        }

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Request shutdown for all workers.
    /// An action already executing is not cancelled; the worker stops before
    /// taking the next one.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers, aborting whatever is still running
    /// after `grace`.
    pub async fn shutdown_and_join(mut self, grace: Duration) {
        self.request_shutdown();

        if tokio::time::timeout(grace, drain(&mut self.joins)).await.is_err() {
            warn!(
                remaining = self.joins.len(),
                grace_ms = grace.as_millis() as u64,
                "workers did not stop in time; aborting"
            );
            self.joins.abort_all();
            drain(&mut self.joins).await;
        }
    }
}

async fn drain(joins: &mut JoinSet<()>) {
    while let Some(joined) = joins.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                error!(error = %e, "worker task panicked");
            }
        }
    }
}

async fn worker_loop(env: WorkerEnv, mut shutdown_rx: watch::Receiver<bool>) {
    let worker_id = env.worker_id();
    debug!(worker_id, "worker started");

    loop {
        // shutdown が来ていたら抜ける
        if *shutdown_rx.borrow() {
            break;
        }

        // dequeue は「待つ」ので select で shutdown と競合させる
        let action = tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    // sender dropped: the group is gone
                    break;
                }
                continue;
            }
            action = env.queue().dequeue() => action,
        };

        run_action(&env, action).await;

        // 成功・retry・drop・panic どれでも 1 回だけ complete にする
        if let Err(e) = env.queue().mark_complete() {
            error!(worker_id, error = %e, "queue accounting broken");
        }
    }

    debug!(worker_id, "worker stopped");
}

/// Execute one action; a panic is logged and reported instead of taking the
/// worker down.
async fn run_action(env: &WorkerEnv, action: Box<dyn Action>) {
    let name = action.name().to_owned();

    match AssertUnwindSafe(action.execute(env)).catch_unwind().await {
        Ok(state) => {
            debug!(worker_id = env.worker_id(), action = %name, ?state, "action finished");
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(
                worker_id = env.worker_id(),
                action = %name,
                panic = %message,
                "action panicked"
            );
            env.report_failure(FailureEvent {
                action_id: None,
                action: name,
                retry_count: 0,
                kind: FailureKind::Panicked { message },
            });
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

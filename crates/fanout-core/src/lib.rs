//! fanout-core
//!
//! Bounded-concurrency task queue for HTTP fan-out work.
//!
//! # Modules
//! - **queue**: FIFO work list with completion counting, action state machine, retry policy
//! - **action**: `Action` trait, `SleepAction` / `FnAction`, `HttpAction`
//! - **handler**: response handler chain, built-in handlers, name registry
//! - **worker** / **runner**: worker pool and the run entry point
//! - **session**: shared HTTP client of a run
//! - **observer**: opt-in failure and retry callbacks
//! - **persist**: file helpers (text, JSON, CSV)
//! - **config** / **context** / **error** / **ids**

pub mod action;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod ids;
pub mod observer;
pub mod persist;
pub mod queue;
pub mod runner;
pub mod session;
pub mod worker;

pub use action::{Action, FnAction, HttpAction, HttpActionBuilder, SleepAction, WorkerEnv};
pub use config::{ActionConfig, JobFile, RunnerConfig, SessionConfig};
pub use context::Context;
pub use error::FanoutError;
pub use handler::{HandlerChain, HandlerError, HandlerRegistry, Response, ResponseHandler};
pub use ids::ActionId;
pub use observer::{CollectingObserver, FailureEvent, FailureKind, FailureObserver, RetryEvent};
pub use queue::{ActionState, QueueCounts, RetryPolicy, TaskQueue};
pub use runner::Runner;
pub use session::Session;

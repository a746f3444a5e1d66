//! `fanout`: run sleep demos or JSON job files through the task queue.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fanout_core::context::keys;
use fanout_core::persist;
use fanout_core::{
    Action, CollectingObserver, Context, HandlerRegistry, JobFile, Runner, RunnerConfig,
    SleepAction,
};

const DEFAULT_LOG_FILTER: &str = "fanout=info,fanout_core=info";

#[derive(Parser, Debug)]
#[command(name = "fanout")]
#[command(about = "Bounded-concurrency HTTP fan-out runner")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run sleeping actions on a worker pool and print their results
    Demo {
        /// Number of actions to seed
        #[arg(long, default_value_t = 20)]
        actions: usize,

        /// Number of workers
        #[arg(long, default_value_t = 5)]
        workers: usize,

        /// Upper bound of each action's random sleep
        #[arg(long, default_value_t = 1_000)]
        max_sleep_ms: u64,
    },

    /// Run the HTTP actions described in a JSON job file
    Run {
        /// Job file (runner settings plus seed actions)
        job: PathBuf,

        /// Override the worker count from the job file
        #[arg(long)]
        workers: Option<usize>,

        /// Write every seed action's final context to this JSON file
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new(DEFAULT_LOG_FILTER),
        1 => EnvFilter::new("fanout=debug,fanout_core=debug"),
        _ => EnvFilter::new("trace"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Demo {
            actions,
            workers,
            max_sleep_ms,
        } => demo(actions, workers, Duration::from_millis(max_sleep_ms)).await,
        Commands::Run {
            job,
            workers,
            output,
        } => run_job(job, workers, output).await,
    }
}

async fn demo(count: usize, workers: usize, max_sleep: Duration) -> Result<()> {
    let min_sleep = Duration::from_millis(50).min(max_sleep);
    let contexts: Vec<Context> = (0..count).map(|_| Context::new()).collect();
    let actions: Vec<Box<dyn Action>> = contexts
        .iter()
        .enumerate()
        .map(|(i, ctx)| {
            SleepAction::new(format!("Action {i}"))
                .with_sleep_range(min_sleep, max_sleep)
                .with_context(ctx.clone())
                .boxed()
        })
        .collect();

    Runner::new(RunnerConfig::default())
        .run(actions, workers)
        .await
        .context("demo run failed")?;

    for ctx in &contexts {
        if let Some(result) = ctx.get_str(keys::RESULT) {
            println!("{result}");
        }
    }
    Ok(())
}

async fn run_job(path: PathBuf, workers: Option<usize>, output: Option<PathBuf>) -> Result<()> {
    let job = JobFile::from_path(&path)
        .with_context(|| format!("failed to load job file {}", path.display()))?;
    let config = job.runner.clone().with_env_overrides()?;
    let workers = workers.unwrap_or(config.workers);

    let registry = HandlerRegistry::with_builtins();
    let actions = job.build_actions(&registry)?;
    let contexts: Vec<Context> = actions.iter().map(|a| a.context().clone()).collect();
    let seeds: Vec<Box<dyn Action>> = actions.into_iter().map(Action::boxed).collect();

    let observer = Arc::new(CollectingObserver::new());
    let runner = Runner::http(config).with_observer(observer.clone());

    // dropping the run future aborts the workers
    tokio::select! {
        result = runner.run(seeds, workers) => result.context("job run failed")?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted; outstanding actions abandoned");
            return Ok(());
        }
    }

    let failures = observer.failures();
    if failures.is_empty() {
        info!(retries = observer.retries().len(), "job finished");
    } else {
        warn!(
            failures = failures.len(),
            retries = observer.retries().len(),
            "job finished with dropped actions"
        );
        for failure in &failures {
            warn!(action = %failure.action, reason = %failure.kind, "dropped");
        }
    }

    if let Some(output) = output {
        let snapshot: Vec<Value> = contexts
            .iter()
            .map(|ctx| Value::Object(ctx.snapshot()))
            .collect();
        let mut report = Map::new();
        report.insert("contexts".into(), Value::Array(snapshot));
        report.insert("failures".into(), serde_json::to_value(&failures)?);
        persist::save_json(&report, &output, 2)
            .with_context(|| format!("failed to write {}", output.display()))?;
        info!(path = %output.display(), "wrote run report");
    }
    Ok(())
}

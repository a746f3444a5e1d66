//! Runner, session and job-file configuration.
//!
//! Everything deserialises from JSON with defaults for missing fields, so a
//! job file only has to name what it changes.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::action::HttpAction;
use crate::context::Context;
use crate::error::FanoutError;
use crate::handler::HandlerRegistry;
use crate::queue::RetryPolicy;

pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;

/// Settings for the shared HTTP client of one run.
///
/// Request timeouts belong here; the queue engine itself has none.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    pub timeout_secs: Option<f64>,
    pub connect_timeout_secs: Option<f64>,
    pub user_agent: Option<String>,
    pub default_headers: BTreeMap<String, String>,

    /// Ignore proxy environment variables.
    pub no_proxy: bool,
}

impl SessionConfig {
    /// Errors on negative, NaN or out-of-range seconds.
    pub fn timeout(&self) -> Result<Option<Duration>, FanoutError> {
        self.timeout_secs
            .map(|secs| seconds("timeoutSecs", secs))
            .transpose()
    }

    pub fn connect_timeout(&self) -> Result<Option<Duration>, FanoutError> {
        self.connect_timeout_secs
            .map(|secs| seconds("connectTimeoutSecs", secs))
            .transpose()
    }
}

fn seconds(field: &str, secs: f64) -> Result<Duration, FanoutError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| FanoutError::Config(format!("{field}={secs}: {e}")))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunnerConfig {
    /// Worker count used by `Runner::run_with_default_workers`.
    pub workers: usize,

    /// How long shutdown waits for workers before aborting them.
    pub shutdown_grace_ms: u64,

    pub session: SessionConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            session: SessionConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Override fields from `FANOUT_WORKERS` and `FANOUT_TIMEOUT_SECS`.
    pub fn with_env_overrides(mut self) -> Result<Self, FanoutError> {
        if let Ok(raw) = std::env::var("FANOUT_WORKERS") {
            self.workers = raw
                .parse()
                .map_err(|e| FanoutError::Config(format!("FANOUT_WORKERS={raw}: {e}")))?;
        }
        if let Ok(raw) = std::env::var("FANOUT_TIMEOUT_SECS") {
            let secs: f64 = raw
                .parse()
                .map_err(|e| FanoutError::Config(format!("FANOUT_TIMEOUT_SECS={raw}: {e}")))?;
            seconds("FANOUT_TIMEOUT_SECS", secs)?;
            self.session.timeout_secs = Some(secs);
        }
        Ok(self)
    }
}

fn default_true() -> bool {
    true
}

fn default_retry_limit() -> u32 {
    RetryPolicy::default().retry_limit
}

/// Declarative description of one HTTP action.
///
/// Handlers are referenced by name and resolved through a `HandlerRegistry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionConfig {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub request_params: Map<String, Value>,
    #[serde(default)]
    pub internal_params: Map<String, Value>,
    #[serde(default = "default_true")]
    pub retry_on_fail: bool,
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    #[serde(default)]
    pub response_handlers: Vec<String>,
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl ActionConfig {
    pub fn into_action(self, registry: &HandlerRegistry) -> Result<HttpAction, FanoutError> {
        let method = Method::from_bytes(self.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| FanoutError::InvalidMethod(self.method.clone()))?;
        let handlers = registry.resolve(&self.response_handlers)?;
        let policy = RetryPolicy::default()
            .with_retry_on_fail(self.retry_on_fail)
            .with_retry_limit(self.retry_limit);

        Ok(HttpAction::builder(method, self.url)
            .request_params(self.request_params)
            .internal_params(self.internal_params)
            .retry_policy(policy)
            .handler_chain(handlers)
            .context(Context::from_map(self.context))
            .build())
    }
}

/// A run described in one file: runner settings plus seed actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobFile {
    pub runner: RunnerConfig,
    pub actions: Vec<ActionConfig>,
}

impl JobFile {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FanoutError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, FanoutError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn build_actions(
        &self,
        registry: &HandlerRegistry,
    ) -> Result<Vec<HttpAction>, FanoutError> {
        self.actions
            .iter()
            .cloned()
            .map(|config| config.into_action(registry))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn runner_config_defaults() {
        let config: RunnerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.shutdown_grace(), Duration::from_secs(5));
        assert_eq!(config.session.timeout().unwrap(), None);
    }

    #[test]
    fn action_config_defaults_match_http_action_defaults() {
        let config: ActionConfig =
            serde_json::from_value(json!({"method": "get", "url": "http://localhost/x"})).unwrap();
        assert!(config.retry_on_fail);
        assert_eq!(config.retry_limit, 5);
        assert!(config.request_params.is_empty());
        assert!(config.response_handlers.is_empty());
    }

    #[test]
    fn job_file_builds_actions_through_registry() {
        let job = JobFile::from_json(
            r#"{
                "runner": {"workers": 3, "session": {"timeoutSecs": 2.5}},
                "actions": [{
                    "method": "GET",
                    "url": "http://localhost/orders",
                    "requestParams": {"page": 1},
                    "retryLimit": 2,
                    "responseHandlers": ["check_for_pages", "store_page_text"],
                    "context": {"region": "10000033"}
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(job.runner.workers, 3);
        assert_eq!(
            job.runner.session.timeout().unwrap(),
            Some(Duration::from_millis(2500))
        );

        let registry = HandlerRegistry::with_builtins();
        let actions = job.build_actions(&registry).unwrap();
        assert_eq!(actions.len(), 1);

        let action = &actions[0];
        assert_eq!(action.method(), &Method::GET);
        assert_eq!(action.retry_policy().retry_limit, 2);
        assert_eq!(action.handlers().len(), 2);
        assert_eq!(action.request_params().get("page"), Some(&json!(1)));
        assert_eq!(action.context().get_str("region").as_deref(), Some("10000033"));
    }

    #[test]
    fn unknown_handler_name_is_rejected() {
        let config: ActionConfig = serde_json::from_value(json!({
            "method": "GET",
            "url": "http://localhost/",
            "responseHandlers": ["no_such_handler"]
        }))
        .unwrap();
        let err = config.into_action(&HandlerRegistry::with_builtins()).unwrap_err();
        assert!(matches!(err, FanoutError::HandlerNotFound(name) if name == "no_such_handler"));
    }

    #[test]
    fn invalid_method_is_rejected() {
        let config: ActionConfig =
            serde_json::from_value(json!({"method": "GE T", "url": "http://localhost/"})).unwrap();
        let err = config.into_action(&HandlerRegistry::new()).unwrap_err();
        assert!(matches!(err, FanoutError::InvalidMethod(_)));
    }

    #[rstest]
    #[case(-1.0)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    #[case(1e300)]
    fn out_of_range_timeouts_are_config_errors(#[case] secs: f64) {
        let session = SessionConfig {
            timeout_secs: Some(secs),
            ..SessionConfig::default()
        };
        assert!(matches!(session.timeout(), Err(FanoutError::Config(_))));

        let session = SessionConfig {
            connect_timeout_secs: Some(secs),
            ..SessionConfig::default()
        };
        assert!(matches!(session.connect_timeout(), Err(FanoutError::Config(_))));
    }

    #[test]
    fn negative_timeout_in_job_file_is_rejected() {
        let job = JobFile::from_json(r#"{"runner": {"session": {"timeoutSecs": -1}}}"#).unwrap();
        assert!(job.runner.session.timeout().is_err());
    }
}

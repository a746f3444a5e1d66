//! Retry policy: decides what happens after an attempt.

use serde::{Deserialize, Serialize};

use crate::observer::FailureKind;

/// What one attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    /// The server answered with this status.
    Status(u16),

    /// The request never produced a response (connect, timeout, protocol,
    /// malformed pass-through option).
    Transport(String),
}

/// The next step for an action after an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Status 200: run the response handler chain.
    RunHandlers,

    /// Put the same action back on the queue.
    Retry { reason: String },

    /// Give up.
    Drop(FailureKind),
}

/// Retry policy for HTTP actions.
///
/// Only the configured transient statuses (503/504 by default) are retried.
/// Transport errors are dropped without retry unless
/// `retry_transport_errors` is switched on; the default keeps the historical
/// behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    pub retry_on_fail: bool,

    /// Maximum number of attempts, including the first one.
    pub retry_limit: u32,

    pub transient_statuses: Vec<u16>,

    pub retry_transport_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_on_fail: true,
            retry_limit: 5,
            transient_statuses: vec![503, 504],
            retry_transport_errors: false,
        }
    }
}

impl RetryPolicy {
    pub fn with_retry_on_fail(mut self, retry_on_fail: bool) -> Self {
        self.retry_on_fail = retry_on_fail;
        self
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    pub fn with_transient_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.transient_statuses = statuses.into_iter().collect();
        self
    }

    pub fn with_retry_transport_errors(mut self, enabled: bool) -> Self {
        self.retry_transport_errors = enabled;
        self
    }

    pub fn is_transient(&self, status: u16) -> bool {
        self.transient_statuses.contains(&status)
    }

    /// Decide the next step.
    ///
    /// # Arguments
    /// * `attempts` - Attempts issued so far, including the one that produced `result`.
    /// * `result` - What that attempt produced.
    pub fn decide(&self, attempts: u32, result: &AttemptResult) -> Decision {
        match result {
            AttemptResult::Status(200) => Decision::RunHandlers,
            AttemptResult::Status(status) if self.is_transient(*status) => {
                if !self.retry_on_fail {
                    Decision::Drop(FailureKind::TransientServerError { status: *status })
                } else if attempts >= self.retry_limit {
                    Decision::Drop(FailureKind::RetryExhausted {
                        last_status: Some(*status),
                    })
                } else {
                    Decision::Retry {
                        reason: format!("status {status}"),
                    }
                }
            }
            AttemptResult::Status(status) => {
                Decision::Drop(FailureKind::PermanentHttpError { status: *status })
            }
            AttemptResult::Transport(message) => {
                if self.retry_transport_errors && self.retry_on_fail {
                    if attempts >= self.retry_limit {
                        Decision::Drop(FailureKind::RetryExhausted { last_status: None })
                    } else {
                        Decision::Retry {
                            reason: message.clone(),
                        }
                    }
                } else {
                    Decision::Drop(FailureKind::TransportError {
                        message: message.clone(),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_policy_has_historical_values() {
        let policy = RetryPolicy::default();
        assert!(policy.retry_on_fail);
        assert_eq!(policy.retry_limit, 5);
        assert_eq!(policy.transient_statuses, vec![503, 504]);
        assert!(!policy.retry_transport_errors);
    }

    #[rstest]
    #[case(1, 200, Decision::RunHandlers)]
    #[case(5, 200, Decision::RunHandlers)]
    #[case(1, 503, Decision::Retry { reason: "status 503".into() })]
    #[case(4, 504, Decision::Retry { reason: "status 504".into() })]
    #[case(5, 503, Decision::Drop(FailureKind::RetryExhausted { last_status: Some(503) }))]
    #[case(1, 404, Decision::Drop(FailureKind::PermanentHttpError { status: 404 }))]
    #[case(1, 500, Decision::Drop(FailureKind::PermanentHttpError { status: 500 }))]
    #[case(1, 201, Decision::Drop(FailureKind::PermanentHttpError { status: 201 }))]
    fn status_decisions(#[case] attempts: u32, #[case] status: u16, #[case] expected: Decision) {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(attempts, &AttemptResult::Status(status)), expected);
    }

    #[test]
    fn transient_without_retry_on_fail_is_dropped() {
        let policy = RetryPolicy::default().with_retry_on_fail(false);
        assert_eq!(
            policy.decide(1, &AttemptResult::Status(503)),
            Decision::Drop(FailureKind::TransientServerError { status: 503 })
        );
    }

    #[test]
    fn transport_errors_are_not_retried_by_default() {
        let policy = RetryPolicy::default();
        let decision = policy.decide(1, &AttemptResult::Transport("connection refused".into()));
        assert_eq!(
            decision,
            Decision::Drop(FailureKind::TransportError {
                message: "connection refused".into()
            })
        );
    }

    #[test]
    fn transport_errors_retry_when_opted_in() {
        let policy = RetryPolicy::default()
            .with_retry_limit(2)
            .with_retry_transport_errors(true);
        let err = AttemptResult::Transport("timed out".into());

        assert_eq!(
            policy.decide(1, &err),
            Decision::Retry {
                reason: "timed out".into()
            }
        );
        assert_eq!(
            policy.decide(2, &err),
            Decision::Drop(FailureKind::RetryExhausted { last_status: None })
        );
    }

    #[test]
    fn custom_transient_statuses() {
        let policy = RetryPolicy::default().with_transient_statuses([429]);
        assert!(matches!(
            policy.decide(1, &AttemptResult::Status(429)),
            Decision::Retry { .. }
        ));
        assert_eq!(
            policy.decide(1, &AttemptResult::Status(503)),
            Decision::Drop(FailureKind::PermanentHttpError { status: 503 })
        );
    }

    #[test]
    fn deserializes_with_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"retryLimit": 2}"#).unwrap();
        assert_eq!(policy.retry_limit, 2);
        assert!(policy.retry_on_fail);
        assert_eq!(policy.transient_statuses, vec![503, 504]);
    }
}

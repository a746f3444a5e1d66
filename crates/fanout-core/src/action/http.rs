//! One HTTP request with retry bookkeeping and a response handler chain.

use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{Action, WorkerEnv};
use crate::context::Context;
use crate::error::FanoutError;
use crate::handler::{HandlerChain, Response, ResponseHandler};
use crate::ids::ActionId;
use crate::observer::{FailureEvent, FailureKind, RetryEvent};
use crate::queue::{ActionState, AttemptResult, Decision, RetryPolicy, RetryState};
use crate::session::Session;

const PAGE_PARAM: &str = "page";
const BODY_EXCERPT_CHARS: usize = 512;

/// An HTTP request plus everything needed to retry it and process its
/// response.
///
/// `request_params` become the query string. `internal_params` are
/// pass-through request options (`headers`, `json`, `body`/`data`,
/// `timeout`); unknown keys are ignored.
#[derive(Clone)]
pub struct HttpAction {
    id: ActionId,
    parent: Option<ActionId>,
    label: String,
    method: Method,
    url: String,
    request_params: Map<String, Value>,
    internal_params: Map<String, Value>,
    policy: RetryPolicy,
    retry: RetryState,
    handlers: HandlerChain,
    context: Context,
}

impl HttpAction {
    pub fn builder(method: Method, url: impl Into<String>) -> HttpActionBuilder {
        HttpActionBuilder::new(method, url.into())
    }

    pub fn get(url: impl Into<String>) -> HttpActionBuilder {
        Self::builder(Method::GET, url)
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    /// The action this one was fanned out from.
    pub fn parent(&self) -> Option<ActionId> {
        self.parent
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn request_params(&self) -> &Map<String, Value> {
        &self.request_params
    }

    pub fn request_params_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.request_params
    }

    pub fn internal_params(&self) -> &Map<String, Value> {
        &self.internal_params
    }

    pub fn internal_params_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.internal_params
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn retry_state(&self) -> &RetryState {
        &self.retry
    }

    /// Attempts issued so far.
    pub fn retry_count(&self) -> u32 {
        self.retry.retry_count
    }

    pub fn state(&self) -> ActionState {
        self.retry.state
    }

    pub fn handlers(&self) -> &HandlerChain {
        &self.handlers
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// `request_params["page"]` as a number. Numeric strings are accepted.
    pub fn page(&self) -> Option<u64> {
        match self.request_params.get(PAGE_PARAM)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// `request_params["page"]` as text, the way it is sent on the wire.
    pub fn page_label(&self) -> Option<String> {
        self.request_params.get(PAGE_PARAM).and_then(query_value)
    }

    /// A copy for another page of the same listing.
    ///
    /// Both parameter maps are deep copies, the handler chain and the context
    /// are shared, and the retry count starts over.
    pub fn sibling(&self, page: u64) -> HttpAction {
        let mut request_params = self.request_params.clone();
        request_params.insert(PAGE_PARAM.to_owned(), Value::from(page));

        HttpAction {
            id: ActionId::new(),
            parent: Some(self.id),
            label: self.label.clone(),
            method: self.method.clone(),
            url: self.url.clone(),
            request_params,
            internal_params: self.internal_params.clone(),
            policy: self.policy.clone(),
            retry: RetryState::new(),
            handlers: self.handlers.clone(),
            context: self.context.clone(),
        }
    }

    async fn send(&self, session: &Session) -> Result<Response, String> {
        let request = session
            .client()
            .request(self.method.clone(), &self.url)
            .query(&query_pairs(&self.request_params));
        let request =
            apply_internal_params(request, &self.internal_params).map_err(|e| e.to_string())?;

        let response = request.send().await.map_err(|e| error_chain(&e))?;
        Ok(Response::new(response))
    }

    /// Put the action back on the queue.
    fn requeue(mut self: Box<Self>, env: &WorkerEnv, reason: String) -> ActionState {
        warn!(
            action_id = %self.id,
            action = %self.label,
            attempt = self.retry.retry_count,
            retry_limit = self.policy.retry_limit,
            reason = %reason,
            "retrying action"
        );
        env.observer().on_retry(&RetryEvent {
            action_id: self.id,
            action: self.label.clone(),
            retry_count: self.retry.retry_count,
            retry_limit: self.policy.retry_limit,
            reason: reason.clone(),
        });

        self.retry.mark_retrying(reason);
        self.retry.requeue();
        env.queue().enqueue(self);
        ActionState::Retrying
    }

    fn drop_with(&mut self, env: &WorkerEnv, kind: FailureKind) -> ActionState {
        warn!(
            action_id = %self.id,
            action = %self.label,
            retry_count = self.retry.retry_count,
            reason = %kind,
            "action dropped"
        );
        self.retry.mark_dropped(kind.to_string());
        env.report_failure(FailureEvent {
            action_id: Some(self.id),
            action: self.label.clone(),
            retry_count: self.retry.retry_count,
            kind,
        });
        ActionState::Dropped
    }

    async fn log_error_response(&self, response: &mut Response) {
        let body = response.text().await.unwrap_or_default();
        // bound outside the macro: tracing brings its own `Value` into scope
        let internal_params = Value::Object(self.internal_params.clone());
        warn!(
            action_id = %self.id,
            status = response.status().as_u16(),
            url = %response.url(),
            internal_params = %internal_params,
            body = %excerpt(&body),
            "unsuccessful response"
        );
    }
}

impl std::fmt::Debug for HttpAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAction")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("url", &self.url)
            .field("request_params", &self.request_params)
            .field("retry", &self.retry)
            .field("handlers", &self.handlers.names())
            .finish()
    }
}

#[async_trait]
impl Action for HttpAction {
    fn name(&self) -> &str {
        &self.label
    }

    async fn execute(self: Box<Self>, env: &WorkerEnv) -> ActionState {
        let mut this = self;

        // seeded or re-enqueued with nothing left to spend
        if this.retry.is_exhausted(this.policy.retry_limit) {
            let kind = FailureKind::RetryExhausted {
                last_status: this.retry.last_status,
            };
            return this.drop_with(env, kind);
        }
        let Some(session) = env.session() else {
            return this.drop_with(env, FailureKind::NoSession);
        };

        this.retry.start_attempt();
        debug!(
            worker_id = env.worker_id(),
            action_id = %this.id,
            attempt = this.retry.retry_count,
            method = %this.method,
            url = %this.url,
            "sending request"
        );

        let mut response = match this.send(session).await {
            Ok(response) => response,
            Err(message) => {
                let attempt = AttemptResult::Transport(message.clone());
                return match this.policy.decide(this.retry.retry_count, &attempt) {
                    Decision::Retry { reason } => this.requeue(env, reason),
                    Decision::Drop(kind) => this.drop_with(env, kind),
                    Decision::RunHandlers => {
                        this.drop_with(env, FailureKind::TransportError { message })
                    }
                };
            }
        };

        let status = response.status().as_u16();
        this.retry.record_status(status);

        match this
            .policy
            .decide(this.retry.retry_count, &AttemptResult::Status(status))
        {
            Decision::RunHandlers => {
                let outcome = this.handlers.run(&this, &mut response, env.queue()).await;
                match outcome {
                    Ok(()) => {
                        this.retry.mark_succeeded();
                        debug!(
                            action_id = %this.id,
                            attempts = this.retry.retry_count,
                            "action succeeded"
                        );
                        ActionState::Succeeded
                    }
                    Err(failure) => {
                        let kind = FailureKind::HandlerError {
                            handler: failure.handler,
                            message: failure.source.to_string(),
                        };
                        this.drop_with(env, kind)
                    }
                }
            }
            Decision::Retry { reason } => {
                this.log_error_response(&mut response).await;
                this.requeue(env, reason)
            }
            Decision::Drop(kind) => {
                this.log_error_response(&mut response).await;
                this.drop_with(env, kind)
            }
        }
    }
}

/// Builder for `HttpAction`.
pub struct HttpActionBuilder {
    method: Method,
    url: String,
    request_params: Map<String, Value>,
    internal_params: Map<String, Value>,
    policy: RetryPolicy,
    handlers: HandlerChain,
    context: Context,
}

impl HttpActionBuilder {
    fn new(method: Method, url: String) -> Self {
        Self {
            method,
            url,
            request_params: Map::new(),
            internal_params: Map::new(),
            policy: RetryPolicy::default(),
            handlers: HandlerChain::new(),
            context: Context::new(),
        }
    }

    pub fn request_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.request_params.insert(key.into(), value.into());
        self
    }

    pub fn request_params(mut self, params: Map<String, Value>) -> Self {
        self.request_params.extend(params);
        self
    }

    pub fn internal_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.internal_params.insert(key.into(), value.into());
        self
    }

    pub fn internal_params(mut self, params: Map<String, Value>) -> Self {
        self.internal_params.extend(params);
        self
    }

    pub fn retry_on_fail(mut self, retry_on_fail: bool) -> Self {
        self.policy.retry_on_fail = retry_on_fail;
        self
    }

    pub fn retry_limit(mut self, retry_limit: u32) -> Self {
        self.policy.retry_limit = retry_limit;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn handler(mut self, handler: Arc<dyn ResponseHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn handlers(
        mut self,
        handlers: impl IntoIterator<Item = Arc<dyn ResponseHandler>>,
    ) -> Self {
        for handler in handlers {
            self.handlers.push(handler);
        }
        self
    }

    pub fn handler_chain(mut self, chain: HandlerChain) -> Self {
        self.handlers = chain;
        self
    }

    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn build(self) -> HttpAction {
        HttpAction {
            id: ActionId::new(),
            parent: None,
            label: format!("{} {}", self.method, self.url),
            method: self.method,
            url: self.url,
            request_params: self.request_params,
            internal_params: self.internal_params,
            policy: self.policy,
            retry: RetryState::new(),
            handlers: self.handlers,
            context: self.context,
        }
    }
}

/// Strings go out verbatim, other scalars as their JSON text, nulls are
/// skipped.
fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn query_pairs(params: &Map<String, Value>) -> Vec<(String, String)> {
    params
        .iter()
        .filter_map(|(key, value)| query_value(value).map(|v| (key.clone(), v)))
        .collect()
}

fn invalid_option(key: &str, reason: &str) -> FanoutError {
    FanoutError::InvalidOption {
        key: key.to_owned(),
        reason: reason.to_owned(),
    }
}

fn apply_internal_params(
    mut request: RequestBuilder,
    params: &Map<String, Value>,
) -> Result<RequestBuilder, FanoutError> {
    for (key, value) in params {
        request = match key.as_str() {
            "headers" => {
                let headers = value
                    .as_object()
                    .ok_or_else(|| invalid_option(key, "expected an object"))?;
                headers.iter().fold(request, |request, (name, value)| {
                    let value = value
                        .as_str()
                        .map(str::to_owned)
                        .unwrap_or_else(|| value.to_string());
                    request.header(name.as_str(), value)
                })
            }
            "json" => request.json(value),
            "body" | "data" => match value {
                Value::String(s) => request.body(s.clone()),
                other => request.body(other.to_string()),
            },
            "timeout" => {
                let timeout = value
                    .as_f64()
                    .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                    .ok_or_else(|| invalid_option(key, "expected seconds within duration range"))?;
                request.timeout(timeout)
            }
            _ => {
                debug!(option = %key, "ignoring unrecognised request option");
                request
            }
        };
    }
    Ok(request)
}

/// reqwest's Display omits the cause; walk the source chain.
fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(BODY_EXCERPT_CHARS) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use rstest::rstest;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::handler::HandlerError;
    use crate::observer::CollectingObserver;
    use crate::queue::TaskQueue;

    /// Records the retry count it was run at.
    #[derive(Default)]
    struct RecordAttempts {
        seen: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl ResponseHandler for RecordAttempts {
        fn name(&self) -> &str {
            "record_attempts"
        }

        async fn handle(
            &self,
            action: &HttpAction,
            _response: &mut Response,
            _queue: &TaskQueue,
        ) -> Result<(), HandlerError> {
            self.seen.lock().unwrap().push(action.retry_count());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl ResponseHandler for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn handle(
            &self,
            _action: &HttpAction,
            _response: &mut Response,
            _queue: &TaskQueue,
        ) -> Result<(), HandlerError> {
            Err(HandlerError::Other("boom".into()))
        }
    }

    #[derive(Default)]
    struct Counting(AtomicU32);

    #[async_trait]
    impl ResponseHandler for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn handle(
            &self,
            _action: &HttpAction,
            _response: &mut Response,
            _queue: &TaskQueue,
        ) -> Result<(), HandlerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn env_with(queue: &TaskQueue, observer: Arc<CollectingObserver>) -> WorkerEnv {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let session = Session::from_client(client);
        WorkerEnv::new(queue.clone(), Some(Arc::new(session)), observer)
    }

    /// Drives one action (and its re-enqueued retries) to a terminal state
    /// on the current task.
    async fn drive(action: HttpAction, env: &WorkerEnv) -> ActionState {
        let mut state = Box::new(action).execute(env).await;
        while state == ActionState::Retrying {
            let next = env.queue().try_dequeue().expect("retry was enqueued");
            env.queue().mark_complete().unwrap();
            state = next.execute(env).await;
        }
        state
    }

    #[tokio::test]
    async fn retries_transient_status_then_runs_handlers_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let recorder = Arc::new(RecordAttempts::default());
        let observer = Arc::new(CollectingObserver::new());
        let queue = TaskQueue::new();
        let env = env_with(&queue, Arc::clone(&observer));

        let action = HttpAction::get(format!("{}/flaky", server.uri()))
            .handler(recorder.clone())
            .build();
        let state = drive(action, &env).await;

        assert_eq!(state, ActionState::Succeeded);
        assert_eq!(*recorder.seen.lock().unwrap(), vec![4]);
        assert_eq!(observer.retries().len(), 3);
        assert!(observer.failures().is_empty());
        assert_eq!(server.received_requests().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn always_transient_issues_exactly_retry_limit_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let handler = Arc::new(Counting::default());
        let observer = Arc::new(CollectingObserver::new());
        let queue = TaskQueue::new();
        let env = env_with(&queue, Arc::clone(&observer));

        let action = HttpAction::get(server.uri())
            .retry_limit(3)
            .handler(handler.clone())
            .build();
        let state = drive(action, &env).await;

        assert_eq!(state, ActionState::Dropped);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
        assert_eq!(handler.0.load(Ordering::SeqCst), 0);

        let failures = observer.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].retry_count, 3);
        assert_eq!(
            failures[0].kind,
            FailureKind::RetryExhausted {
                last_status: Some(503)
            }
        );
    }

    #[tokio::test]
    async fn permanent_error_is_dropped_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
            .expect(1)
            .mount(&server)
            .await;

        let handler = Arc::new(Counting::default());
        let observer = Arc::new(CollectingObserver::new());
        let queue = TaskQueue::new();
        let env = env_with(&queue, Arc::clone(&observer));

        let action = HttpAction::get(server.uri()).handler(handler.clone()).build();
        let state = Box::new(action).execute(&env).await;

        assert_eq!(state, ActionState::Dropped);
        assert_eq!(queue.counts().pending, 0);
        assert_eq!(handler.0.load(Ordering::SeqCst), 0);
        assert_eq!(
            observer.failures()[0].kind,
            FailureKind::PermanentHttpError { status: 404 }
        );
    }

    #[tokio::test]
    async fn transient_with_retry_disabled_is_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(504))
            .expect(1)
            .mount(&server)
            .await;

        let observer = Arc::new(CollectingObserver::new());
        let queue = TaskQueue::new();
        let env = env_with(&queue, Arc::clone(&observer));

        let action = HttpAction::get(server.uri()).retry_on_fail(false).build();
        let state = Box::new(action).execute(&env).await;

        assert_eq!(state, ActionState::Dropped);
        assert_eq!(
            observer.failures()[0].kind,
            FailureKind::TransientServerError { status: 504 }
        );
    }

    #[tokio::test]
    async fn transport_error_is_dropped_without_retry() {
        // bind then release a port so nothing is listening on it
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let observer = Arc::new(CollectingObserver::new());
        let queue = TaskQueue::new();
        let env = env_with(&queue, Arc::clone(&observer));

        let action = HttpAction::get(format!("http://127.0.0.1:{port}/")).build();
        let state = Box::new(action).execute(&env).await;

        assert_eq!(state, ActionState::Dropped);
        assert_eq!(queue.counts().pending, 0);
        assert!(observer.retries().is_empty());
        assert!(matches!(
            observer.failures()[0].kind,
            FailureKind::TransportError { .. }
        ));
    }

    #[tokio::test]
    async fn missing_session_drops_action() {
        let observer = Arc::new(CollectingObserver::new());
        let queue = TaskQueue::new();
        let env = WorkerEnv::new(queue.clone(), None, observer.clone());

        let state = Box::new(HttpAction::get("http://localhost/").build())
            .execute(&env)
            .await;

        assert_eq!(state, ActionState::Dropped);
        assert_eq!(observer.failures()[0].kind, FailureKind::NoSession);
        assert_eq!(observer.failures()[0].retry_count, 0);
    }

    #[tokio::test]
    async fn handler_error_stops_the_chain() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let after = Arc::new(Counting::default());
        let observer = Arc::new(CollectingObserver::new());
        let queue = TaskQueue::new();
        let env = env_with(&queue, Arc::clone(&observer));

        let action = HttpAction::get(server.uri())
            .handler(Arc::new(Failing))
            .handler(after.clone())
            .build();
        let state = Box::new(action).execute(&env).await;

        assert_eq!(state, ActionState::Dropped);
        assert_eq!(after.0.load(Ordering::SeqCst), 0);
        assert_eq!(
            observer.failures()[0].kind,
            FailureKind::HandlerError {
                handler: "failing".into(),
                message: "boom".into()
            }
        );
    }

    #[tokio::test]
    async fn request_params_become_query_string() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("page", "2"))
            .and(query_param("order_type", "all"))
            .and(query_param("flag", "true"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let handler = Arc::new(Counting::default());
        let queue = TaskQueue::new();
        let env = env_with(&queue, Arc::new(CollectingObserver::new()));

        let action = HttpAction::get(server.uri())
            .request_param("page", 2)
            .request_param("order_type", "all")
            .request_param("flag", true)
            .request_param("skipped", Value::Null)
            .handler(handler.clone())
            .build();
        let state = Box::new(action).execute(&env).await;

        assert_eq!(state, ActionState::Succeeded);
        assert_eq!(handler.0.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[case(json!("soon"))]
    #[case(json!(-1))]
    #[case(json!(1e300))]
    #[tokio::test]
    async fn malformed_internal_option_is_a_transport_drop(#[case] timeout: Value) {
        let observer = Arc::new(CollectingObserver::new());
        let queue = TaskQueue::new();
        let env = env_with(&queue, Arc::clone(&observer));

        let action = HttpAction::get("http://127.0.0.1:9/")
            .internal_param("timeout", timeout)
            .build();
        let state = Box::new(action).execute(&env).await;

        assert_eq!(state, ActionState::Dropped);
        match &observer.failures()[0].kind {
            FailureKind::TransportError { message } => assert!(message.contains("timeout")),
            other => panic!("unexpected failure kind: {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausted_action_is_dropped_before_sending() {
        let server = MockServer::start().await;
        let observer = Arc::new(CollectingObserver::new());
        let queue = TaskQueue::new();
        let env = env_with(&queue, Arc::clone(&observer));

        let action = HttpAction::get(server.uri()).retry_limit(0).build();
        let state = Box::new(action).execute(&env).await;

        assert_eq!(state, ActionState::Dropped);
        assert!(server.received_requests().await.unwrap().is_empty());
        assert_eq!(
            observer.failures()[0].kind,
            FailureKind::RetryExhausted { last_status: None }
        );
    }

    #[test]
    fn sibling_has_independent_params_and_shared_context() {
        let parent = HttpAction::get("http://localhost/orders")
            .request_param("page", 1)
            .request_param("region", "10000002")
            .request_param("filter", json!({"type_id": 34}))
            .internal_param("headers", json!({"x-a": "1"}))
            .build();

        let mut second = parent.sibling(2);
        let third = parent.sibling(3);

        second
            .request_params_mut()
            .insert("region".into(), json!("changed"));
        second.request_params_mut()["filter"]["type_id"] = json!(35);
        second.internal_params_mut()["headers"]["x-a"] = json!("2");

        assert_eq!(parent.page(), Some(1));
        assert_eq!(second.page(), Some(2));
        assert_eq!(third.page(), Some(3));

        for untouched in [&parent, &third] {
            assert_eq!(untouched.request_params()["region"], json!("10000002"));
            assert_eq!(untouched.request_params()["filter"], json!({"type_id": 34}));
            assert_eq!(untouched.internal_params()["headers"], json!({"x-a": "1"}));
        }
        assert_eq!(second.internal_params()["headers"], json!({"x-a": "2"}));

        assert_eq!(third.parent(), Some(parent.id()));
        assert_ne!(second.id(), third.id());
        assert_eq!(third.retry_count(), 0);
        assert!(second.context().ptr_eq(third.context()));
        assert!(third.context().ptr_eq(parent.context()));
    }

    #[test]
    fn page_accepts_numeric_strings() {
        let action = HttpAction::get("http://localhost/")
            .request_param("page", "7")
            .build();
        assert_eq!(action.page(), Some(7));
        assert_eq!(action.page_label().as_deref(), Some("7"));
    }

    #[test]
    fn excerpt_is_char_safe() {
        let long = "é".repeat(BODY_EXCERPT_CHARS + 10);
        assert_eq!(excerpt(&long).chars().count(), BODY_EXCERPT_CHARS);
        assert_eq!(excerpt("short"), "short");
    }
}

//! Response handlers: steps run in order on a successful (200) response.
//!
//! The body is read from the network at most once. `Response` buffers it on
//! first access, so every handler in a chain sees the same bytes.

mod builtin;
mod registry;

pub use builtin::{
    CheckForPages, PagedSavePath, PrintPageNumber, PrintResponse, ProcessResponseToJson,
    SavePathProvider, SaveProcessedResponse, SaveResponse, SaveResponseToCsv, SaveResponseToJson,
    StorePageText, DEFAULT_PAGES_HEADER,
};
pub use registry::HandlerRegistry;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::action::HttpAction;
use crate::persist::PersistError;
use crate::queue::TaskQueue;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("response body is not available")]
    BodyUnavailable,

    #[error("invalid json body: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("{0}")]
    Other(String),
}

/// A received response with a lazily buffered body.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    url: Url,
    raw: Option<reqwest::Response>,
    body: Option<Vec<u8>>,
}

impl Response {
    pub fn new(raw: reqwest::Response) -> Self {
        Self {
            status: raw.status(),
            headers: raw.headers().clone(),
            url: raw.url().clone(),
            raw: Some(raw),
            body: None,
        }
    }

    /// A response whose body is already in memory.
    pub fn buffered(
        status: StatusCode,
        headers: HeaderMap,
        url: Url,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            status,
            headers,
            url,
            raw: None,
            body: Some(body.into()),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Header value as text; `None` when missing or not visible ASCII.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub async fn bytes(&mut self) -> Result<&[u8], HandlerError> {
        if let Some(raw) = self.raw.take() {
            let body = raw.bytes().await.map_err(HandlerError::Body)?;
            self.body = Some(body.to_vec());
        }
        self.body.as_deref().ok_or(HandlerError::BodyUnavailable)
    }

    /// Body decoded as UTF-8, invalid sequences replaced.
    pub async fn text(&mut self) -> Result<String, HandlerError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T, HandlerError> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// One step of a response handler chain.
///
/// Handlers may read the action (parameters, context), mutate the shared
/// context and enqueue new actions.
#[async_trait]
pub trait ResponseHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(
        &self,
        action: &HttpAction,
        response: &mut Response,
        queue: &TaskQueue,
    ) -> Result<(), HandlerError>;
}

/// The handler that stopped a chain.
#[derive(Debug, Error)]
#[error("handler {handler} failed: {source}")]
pub struct ChainError {
    pub handler: String,
    pub source: HandlerError,
}

/// Ordered list of handlers, shared by pagination siblings.
#[derive(Clone, Default)]
pub struct HandlerChain {
    handlers: Vec<Arc<dyn ResponseHandler>>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handler: Arc<dyn ResponseHandler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Run every handler in order; the first error stops the chain.
    pub async fn run(
        &self,
        action: &HttpAction,
        response: &mut Response,
        queue: &TaskQueue,
    ) -> Result<(), ChainError> {
        for handler in &self.handlers {
            handler
                .handle(action, response, queue)
                .await
                .map_err(|source| ChainError {
                    handler: handler.name().to_owned(),
                    source,
                })?;
        }
        Ok(())
    }
}

impl From<Vec<Arc<dyn ResponseHandler>>> for HandlerChain {
    fn from(handlers: Vec<Arc<dyn ResponseHandler>>) -> Self {
        Self { handlers }
    }
}

impl std::fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

//! Built-in response handlers, registered by `HandlerRegistry::with_builtins`
//! under their `name()`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::task::spawn_blocking;
use tracing::{debug, warn};

use super::{HandlerError, Response, ResponseHandler};
use crate::action::HttpAction;
use crate::context::keys;
use crate::persist::{self, PersistError};
use crate::queue::TaskQueue;

/// Response header carrying the total page count.
pub const DEFAULT_PAGES_HEADER: &str = "x-pages";

const JSON_INDENT: usize = 2;

/// Where a save handler writes.
pub trait SavePathProvider: Send + Sync {
    /// `None` means "don't save".
    fn save_path(&self, action: &HttpAction, response: &Response) -> Option<PathBuf>;
}

/// `<dir>/<stem>.<page>_of_<pages>.<extension>`, with the page taken from
/// the request and the total from a response header (both `0` if missing).
#[derive(Debug, Clone)]
pub struct PagedSavePath {
    dir: PathBuf,
    stem: String,
    extension: String,
    pages_header: String,
}

impl PagedSavePath {
    pub fn new(
        dir: impl Into<PathBuf>,
        stem: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
            extension: extension.into(),
            pages_header: DEFAULT_PAGES_HEADER.to_owned(),
        }
    }

    pub fn with_pages_header(mut self, header: impl Into<String>) -> Self {
        self.pages_header = header.into();
        self
    }
}

impl SavePathProvider for PagedSavePath {
    fn save_path(&self, action: &HttpAction, response: &Response) -> Option<PathBuf> {
        let page = action.page_label().unwrap_or_else(|| "0".to_owned());
        let pages = response.header_str(&self.pages_header).unwrap_or("0");
        let file = format!("{}.{page}_of_{pages}.{}", self.stem, self.extension);
        Some(self.dir.join(file))
    }
}

/// The provider if set, `context["savePath"]` otherwise.
fn resolve_save_path(
    provider: Option<&Arc<dyn SavePathProvider>>,
    action: &HttpAction,
    response: &Response,
) -> Option<PathBuf> {
    match provider {
        Some(provider) => provider.save_path(action, response),
        None => action.context().get_str(keys::SAVE_PATH).map(PathBuf::from),
    }
}

/// Emptiness the way the save handlers understand it: null, `false`, zero
/// and empty strings/arrays/objects are not worth writing.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Runs a file write on the blocking pool, off the async workers.
async fn write_blocking<F>(write: F) -> Result<(), HandlerError>
where
    F: FnOnce() -> Result<(), PersistError> + Send + 'static,
{
    spawn_blocking(write)
        .await
        .map_err(|e| HandlerError::Other(format!("save task failed: {e}")))??;
    Ok(())
}

macro_rules! save_handler {
    ($(#[$meta:meta])* $ty:ident) => {
        $(#[$meta])*
        #[derive(Clone, Default)]
        pub struct $ty {
            path_provider: Option<Arc<dyn SavePathProvider>>,
        }

        impl $ty {
            pub fn new() -> Self {
                Self::default()
            }

            pub fn with_path_provider(mut self, provider: Arc<dyn SavePathProvider>) -> Self {
                self.path_provider = Some(provider);
                self
            }

            fn save_path(&self, action: &HttpAction, response: &Response) -> Option<PathBuf> {
                resolve_save_path(self.path_provider.as_ref(), action, response)
            }
        }
    };
}

/// Prints the body to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrintResponse;

#[async_trait]
impl ResponseHandler for PrintResponse {
    fn name(&self) -> &str {
        "print_response"
    }

    async fn handle(
        &self,
        _action: &HttpAction,
        response: &mut Response,
        _queue: &TaskQueue,
    ) -> Result<(), HandlerError> {
        println!("{}", response.text().await?);
        Ok(())
    }
}

/// Prints `page <n> of <total>`.
#[derive(Debug, Clone)]
pub struct PrintPageNumber {
    header: String,
}

impl PrintPageNumber {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
        }
    }
}

impl Default for PrintPageNumber {
    fn default() -> Self {
        Self::new(DEFAULT_PAGES_HEADER)
    }
}

#[async_trait]
impl ResponseHandler for PrintPageNumber {
    fn name(&self) -> &str {
        "print_page_number"
    }

    async fn handle(
        &self,
        action: &HttpAction,
        response: &mut Response,
        _queue: &TaskQueue,
    ) -> Result<(), HandlerError> {
        let page = action.page_label().unwrap_or_else(|| "0".to_owned());
        let total = response.header_str(&self.header).unwrap_or("?");
        println!("page {page} of {total}");
        Ok(())
    }
}

/// Parses the body as JSON into `context["responseData"]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessResponseToJson;

#[async_trait]
impl ResponseHandler for ProcessResponseToJson {
    fn name(&self) -> &str {
        "process_response_to_json"
    }

    async fn handle(
        &self,
        action: &HttpAction,
        response: &mut Response,
        _queue: &TaskQueue,
    ) -> Result<(), HandlerError> {
        let data: Value = response.json().await?;
        action.context().insert(keys::RESPONSE_DATA, data);
        Ok(())
    }
}

save_handler!(
    /// Writes the raw body text.
    SaveResponse
);

#[async_trait]
impl ResponseHandler for SaveResponse {
    fn name(&self) -> &str {
        "save_response"
    }

    async fn handle(
        &self,
        action: &HttpAction,
        response: &mut Response,
        _queue: &TaskQueue,
    ) -> Result<(), HandlerError> {
        let Some(path) = self.save_path(action, response) else {
            return Ok(());
        };
        let text = response.text().await?;
        if text.is_empty() {
            return Ok(());
        }
        let target = path.clone();
        write_blocking(move || persist::save_string(&text, &target)).await?;
        debug!(path = %path.display(), "saved response");
        Ok(())
    }
}

save_handler!(
    /// Writes `context["responseData"]`: strings as-is, anything else as
    /// JSON.
    SaveProcessedResponse
);

#[async_trait]
impl ResponseHandler for SaveProcessedResponse {
    fn name(&self) -> &str {
        "save_processed_response"
    }

    async fn handle(
        &self,
        action: &HttpAction,
        response: &mut Response,
        _queue: &TaskQueue,
    ) -> Result<(), HandlerError> {
        let Some(path) = self.save_path(action, response) else {
            return Ok(());
        };
        let Some(data) = action.context().get(keys::RESPONSE_DATA) else {
            return Ok(());
        };
        if !is_truthy(&data) {
            return Ok(());
        }
        let target = path.clone();
        write_blocking(move || match &data {
            Value::String(text) => persist::save_string(text, &target),
            other => persist::save_json(other, &target, JSON_INDENT),
        })
        .await?;
        debug!(path = %path.display(), "saved processed response");
        Ok(())
    }
}

save_handler!(
    /// Parses the body as JSON and writes it pretty-printed.
    SaveResponseToJson
);

#[async_trait]
impl ResponseHandler for SaveResponseToJson {
    fn name(&self) -> &str {
        "save_response_to_json"
    }

    async fn handle(
        &self,
        action: &HttpAction,
        response: &mut Response,
        _queue: &TaskQueue,
    ) -> Result<(), HandlerError> {
        let Some(path) = self.save_path(action, response) else {
            return Ok(());
        };
        let data: Value = response.json().await?;
        if !is_truthy(&data) {
            return Ok(());
        }
        let target = path.clone();
        write_blocking(move || persist::save_json(&data, &target, JSON_INDENT)).await?;
        debug!(path = %path.display(), "saved response as json");
        Ok(())
    }
}

save_handler!(
    /// Parses the body as a JSON array of flat records and writes CSV.
    SaveResponseToCsv
);

#[async_trait]
impl ResponseHandler for SaveResponseToCsv {
    fn name(&self) -> &str {
        "save_response_to_csv"
    }

    async fn handle(
        &self,
        action: &HttpAction,
        response: &mut Response,
        _queue: &TaskQueue,
    ) -> Result<(), HandlerError> {
        let Some(path) = self.save_path(action, response) else {
            return Ok(());
        };
        let data: Value = response.json().await?;
        if !is_truthy(&data) {
            return Ok(());
        }
        let Value::Array(records) = data else {
            return Err(HandlerError::Other("expected a json array of records".into()));
        };
        let count = records.len();
        let target = path.clone();
        write_blocking(move || persist::save_records_csv(&records, &target)).await?;
        debug!(path = %path.display(), records = count, "saved response as csv");
        Ok(())
    }
}

/// Pagination fan-out.
///
/// On page 1 only: reads the total page count from a response header and
/// enqueues one sibling per page `2..=total`. Missing header or a total of 1
/// means no fan-out; a non-numeric header is an error. With `max_pages`
/// set, a larger advertised total is clamped to it.
#[derive(Debug, Clone)]
pub struct CheckForPages {
    header: String,
    max_pages: Option<u64>,
}

impl CheckForPages {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            max_pages: None,
        }
    }

    pub fn with_max_pages(mut self, max_pages: u64) -> Self {
        self.max_pages = Some(max_pages);
        self
    }
}

impl Default for CheckForPages {
    fn default() -> Self {
        Self::new(DEFAULT_PAGES_HEADER)
    }
}

#[async_trait]
impl ResponseHandler for CheckForPages {
    fn name(&self) -> &str {
        "check_for_pages"
    }

    async fn handle(
        &self,
        action: &HttpAction,
        response: &mut Response,
        queue: &TaskQueue,
    ) -> Result<(), HandlerError> {
        if action.page() != Some(1) {
            return Ok(());
        }
        let Some(raw) = response.header_str(&self.header) else {
            return Ok(());
        };
        let advertised: u64 = raw.trim().parse().map_err(|_| {
            HandlerError::Other(format!("invalid {} header: {raw:?}", self.header))
        })?;
        let total = match self.max_pages {
            Some(max) if advertised > max => {
                warn!(action_id = %action.id(), advertised, max, "page count capped");
                max
            }
            _ => advertised,
        };

        for page in 2..=total {
            queue.enqueue(Box::new(action.sibling(page)));
        }
        if total > 1 {
            debug!(action_id = %action.id(), total, "fanned out pages");
        }
        Ok(())
    }
}

/// Stores the body text under `context["pages"][<page>]`.
///
/// `context["pages"]` is created if missing. Each page writes its own key,
/// so concurrent pages never overwrite each other.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorePageText;

#[async_trait]
impl ResponseHandler for StorePageText {
    fn name(&self) -> &str {
        "store_page_text"
    }

    async fn handle(
        &self,
        action: &HttpAction,
        response: &mut Response,
        _queue: &TaskQueue,
    ) -> Result<(), HandlerError> {
        let entry = match action.page_label() {
            Some(page) => Some((page, response.text().await?)),
            None => None,
        };

        action.context().with(|map| {
            let pages = map
                .entry(keys::PAGES)
                .or_insert_with(|| Value::Object(Map::new()));
            if !pages.is_object() {
                *pages = Value::Object(Map::new());
            }
            if let (Some(pages), Some((page, text))) = (pages.as_object_mut(), entry) {
                pages.insert(page, Value::String(text));
            }
        });
        Ok(())
    }
}

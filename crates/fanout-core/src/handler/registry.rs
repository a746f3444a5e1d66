use std::collections::HashMap;
use std::sync::Arc;

use super::{
    CheckForPages, HandlerChain, PrintPageNumber, PrintResponse, ProcessResponseToJson,
    ResponseHandler, SaveProcessedResponse, SaveResponse, SaveResponseToCsv, SaveResponseToJson,
    StorePageText,
};
use crate::error::FanoutError;

/// Registry of response handlers (name -> handler), used to resolve the
/// handler names of declarative action configs.
///
/// Built during initialization (mutable), read-only afterwards.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ResponseHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// A registry holding every built-in handler under its own name.
    pub fn with_builtins() -> Self {
        let builtins: [Arc<dyn ResponseHandler>; 9] = [
            Arc::new(PrintResponse),
            Arc::new(PrintPageNumber::default()),
            Arc::new(ProcessResponseToJson),
            Arc::new(SaveResponse::new()),
            Arc::new(SaveProcessedResponse::new()),
            Arc::new(SaveResponseToJson::new()),
            Arc::new(SaveResponseToCsv::new()),
            Arc::new(CheckForPages::default()),
            Arc::new(StorePageText),
        ];

        let mut registry = Self::new();
        for handler in builtins {
            registry.handlers.insert(handler.name().to_owned(), handler);
        }
        registry
    }

    /// Register a handler under its `name()`.
    pub fn register(&mut self, handler: Arc<dyn ResponseHandler>) -> Result<(), FanoutError> {
        let name = handler.name().to_owned();
        self.register_as(name, handler)
    }

    /// Register a handler under an explicit name.
    pub fn register_as(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn ResponseHandler>,
    ) -> Result<(), FanoutError> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(FanoutError::DuplicateHandler(name));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ResponseHandler>> {
        self.handlers.get(name)
    }

    /// Build a chain from handler names, in order.
    pub fn resolve(&self, names: &[String]) -> Result<HandlerChain, FanoutError> {
        let mut chain = HandlerChain::new();
        for name in names {
            let handler = self
                .get(name)
                .ok_or_else(|| FanoutError::HandlerNotFound(name.clone()))?;
            chain.push(Arc::clone(handler));
        }
        Ok(chain)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

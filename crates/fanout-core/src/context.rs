//! Shared, mutex-guarded key/value context attached to actions.
//!
//! A `Context` is a handle: cloning it aliases the same map. Pagination
//! siblings hold clones of their parent's handle so every page lands in one
//! place. Workers may run on different threads, so every access goes through
//! the lock; the lock is never held across an `.await`.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

/// Well-known context keys used by the built-in handlers.
pub mod keys {
    /// Parsed response body written by `ProcessResponseToJson`.
    pub const RESPONSE_DATA: &str = "responseData";
    /// Per-page response text written by `StorePageText`.
    pub const PAGES: &str = "pages";
    /// Target file for the save handlers.
    pub const SAVE_PATH: &str = "savePath";
    /// Completion string written by `SleepAction`.
    pub const RESULT: &str = "result";
}

#[derive(Clone, Default)]
pub struct Context {
    inner: Arc<Mutex<Map<String, Value>>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(map)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Map<String, Value>> {
        // A panicking handler must not wedge every sibling sharing the map.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.lock().get(key).and_then(Value::as_str).map(str::to_owned)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.lock().insert(key.into(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.lock().remove(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Run `f` with exclusive access to the whole map.
    ///
    /// This is the read-modify-write primitive: nothing else can observe or
    /// change the map between the read and the write inside `f`.
    pub fn with<R>(&self, f: impl FnOnce(&mut Map<String, Value>) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.lock().clone()
    }

    /// A new, unshared context with a deep copy of the contents.
    pub fn detached_copy(&self) -> Self {
        Self::from_map(self.snapshot())
    }

    /// Whether both handles point at the same underlying map.
    pub fn ptr_eq(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl From<Map<String, Value>> for Context {
    fn from(map: Map<String, Value>) -> Self {
        Self::from_map(map)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Context").field(&*self.lock()).finish()
    }
}

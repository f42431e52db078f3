//! Shared state store passed explicitly through every pipeline run.
//!
//! The store is the only channel through which nodes exchange data. Parallel
//! branches work on [`StateStore::fork`]s and their [`StateStore::changes`]
//! are merged back once the phase completes.

use crate::{FlowError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

// State scope prefixes
pub const KEY_PREFIX_APP: &str = "app:";
pub const KEY_PREFIX_TEMP: &str = "temp:";
pub const KEY_PREFIX_USER: &str = "user:";

/// Maximum length of a state key in bytes.
pub const MAX_STATE_KEY_LEN: usize = 256;

/// Validates a key used to read from or write to the state store.
pub fn validate_state_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(FlowError::Config("state key must not be empty".to_string()));
    }
    if key.len() > MAX_STATE_KEY_LEN {
        return Err(FlowError::Config(format!(
            "state key '{}...' exceeds {MAX_STATE_KEY_LEN} bytes",
            key.chars().take(32).collect::<String>()
        )));
    }
    if key.chars().any(char::is_control) {
        return Err(FlowError::Config(format!("state key {key:?} contains control characters")));
    }
    Ok(())
}

#[derive(Debug, Default)]
struct StoreInner {
    values: HashMap<String, Value>,
    /// Keys written since creation or fork, in first-write order.
    written: Vec<String>,
}

/// Mapping of string keys to values, visible to every node of one run.
///
/// Cloning the store yields another handle onto the same data.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with `values`. Seed values do not count as changes.
    pub fn from_map(values: HashMap<String, Value>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner { values, written: Vec::new() })),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().values.get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.read().values.contains_key(key)
    }

    /// Writes `value` under `key`; the last writer wins.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let mut inner = self.write();
        if !inner.written.contains(&key) {
            inner.written.push(key.clone());
        }
        inner.values.insert(key, value);
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read().values.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().values.is_empty()
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.read().values.clone()
    }

    /// Read-only view restricted to `keys`. Missing keys are simply absent.
    pub fn view<S: AsRef<str>>(&self, keys: &[S]) -> StateView {
        let inner = self.read();
        let values = keys
            .iter()
            .filter_map(|key| {
                let key = key.as_ref();
                inner.values.get(key).map(|value| (key.to_string(), value.clone()))
            })
            .collect();
        StateView { values }
    }

    /// Detached copy of the current contents with an empty change journal.
    pub fn fork(&self) -> StateStore {
        StateStore::from_map(self.snapshot())
    }

    /// Keys written on this handle's store since creation, with their current values.
    pub fn changes(&self) -> Vec<(String, Value)> {
        let inner = self.read();
        inner
            .written
            .iter()
            .filter_map(|key| inner.values.get(key).map(|value| (key.clone(), value.clone())))
            .collect()
    }

    /// Applies changes gathered from a fork.
    pub fn merge(&self, changes: Vec<(String, Value)>) {
        for (key, value) in changes {
            self.set(key, value);
        }
    }
}

/// Read-only view of the state restricted to a set of declared keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateView {
    values: HashMap<String, Value>,
}

impl StateView {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Text rendering of a value: strings verbatim, anything else as JSON.
    pub fn text(&self, key: &str) -> Option<String> {
        self.values.get(key).map(render_value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub(crate) fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

//! Per-plugin keyed storage
//!
//! Each plugin receives its own store at construction, isolated from every
//! other plugin. Values live in process memory only; nothing survives a
//! restart.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

/// Keyed value store handed to a plugin at construction
#[derive(Debug, Default)]
pub struct PluginStorage {
    entries: RwLock<HashMap<String, Value>>,
}

impl PluginStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.entries.write().insert(key.into(), value);
    }

    pub fn delete(&self, key: &str) -> Option<Value> {
        self.entries.write().remove(key)
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Increment a numeric counter, returning the new value.
    pub fn increment(&self, key: &str) -> i64 {
        let mut entries = self.entries.write();
        let next = entries.get(key).and_then(|v| v.as_i64()).unwrap_or(0) + 1;
        entries.insert(key.to_string(), Value::from(next));
        next
    }
}

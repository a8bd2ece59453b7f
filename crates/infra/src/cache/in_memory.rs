use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;

use portico_core::{GatewayError, GatewayResult};

use super::CacheStore;

/// Process-local cache store.
///
/// Reads share a read lock and never block each other.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, JsonValue>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> GatewayError {
    GatewayError::store("cache lock poisoned")
}

impl CacheStore for InMemoryCacheStore {
    fn get(&self, key: &str) -> GatewayResult<Option<JsonValue>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: JsonValue) -> GatewayResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn forget(&self, key: &str) -> GatewayResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.remove(key);
        Ok(())
    }

    fn put_if_absent(&self, key: &str, value: JsonValue) -> GatewayResult<bool> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value);
        Ok(true)
    }
}

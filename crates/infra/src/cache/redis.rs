//! Redis-backed cache store (optional).
//!
//! Shared by every gateway process, so a purge in one worker is visible to
//! the others on their next read. Entries carry no TTL.

use redis::Commands;
use serde_json::Value as JsonValue;

use portico_core::{GatewayError, GatewayResult};

use super::CacheStore;

#[derive(Debug, Clone)]
pub struct RedisCacheStore {
    client: redis::Client,
    prefix: String,
}

impl RedisCacheStore {
    pub fn new(redis_url: impl AsRef<str>, prefix: impl Into<String>) -> GatewayResult<Self> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| GatewayError::store(format!("redis: {e}")))?;
        Ok(Self {
            client,
            prefix: prefix.into(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn connection(&self) -> GatewayResult<redis::Connection> {
        self.client
            .get_connection()
            .map_err(|e| GatewayError::store(format!("redis: {e}")))
    }
}

impl CacheStore for RedisCacheStore {
    fn get(&self, key: &str) -> GatewayResult<Option<JsonValue>> {
        let mut conn = self.connection()?;
        let raw: Option<String> = conn
            .get(self.key(key))
            .map_err(|e| GatewayError::store(format!("redis: {e}")))?;

        raw.map(|s| {
            serde_json::from_str(&s)
                .map_err(|e| GatewayError::store(format!("redis payload for '{key}': {e}")))
        })
        .transpose()
    }

    fn put(&self, key: &str, value: JsonValue) -> GatewayResult<()> {
        let payload = encode(key, &value)?;
        let mut conn = self.connection()?;
        let _: () = conn
            .set(self.key(key), payload)
            .map_err(|e| GatewayError::store(format!("redis: {e}")))?;
        Ok(())
    }

    fn forget(&self, key: &str) -> GatewayResult<()> {
        let mut conn = self.connection()?;
        let _: i64 = conn
            .del(self.key(key))
            .map_err(|e| GatewayError::store(format!("redis: {e}")))?;
        Ok(())
    }

    fn put_if_absent(&self, key: &str, value: JsonValue) -> GatewayResult<bool> {
        let payload = encode(key, &value)?;
        let mut conn = self.connection()?;
        conn.set_nx(self.key(key), payload)
            .map_err(|e| GatewayError::store(format!("redis: {e}")))
    }
}

fn encode(key: &str, value: &JsonValue) -> GatewayResult<String> {
    serde_json::to_string(value)
        .map_err(|e| GatewayError::store(format!("redis payload for '{key}': {e}")))
}

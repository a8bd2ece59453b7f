//! Read-through cache boundary.
//!
//! Values are stored as JSON so the same payloads can live in the process
//! (`InMemoryCacheStore`) or in a backing store shared by every worker
//! (`RedisCacheStore`). Entries never expire; the only invalidation path is an
//! explicit `forget`, driven by the registry's purge (see [`keys`]).
//!
//! ## Version tokens
//!
//! A purge may race with a reader that fetched from the backing store just
//! before the edit. [`remember_versioned`] ties an entry to a version token
//! stored under a separate key: writers re-check the token after `put` and
//! retract the entry when it moved, and purges forget the token before the
//! entries it guards.

pub mod in_memory;
pub mod keys;
#[cfg(feature = "redis")]
pub mod redis;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use uuid::Uuid;

use portico_core::{GatewayError, GatewayResult};

pub use in_memory::InMemoryCacheStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisCacheStore;

/// Key/value cache with manual invalidation.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> GatewayResult<Option<JsonValue>>;
    fn put(&self, key: &str, value: JsonValue) -> GatewayResult<()>;
    fn forget(&self, key: &str) -> GatewayResult<()>;
    /// Store `value` only when `key` is vacant. Returns whether it was stored.
    fn put_if_absent(&self, key: &str, value: JsonValue) -> GatewayResult<bool>;
}

impl<S> CacheStore for Arc<S>
where
    S: CacheStore + ?Sized,
{
    fn get(&self, key: &str) -> GatewayResult<Option<JsonValue>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: JsonValue) -> GatewayResult<()> {
        (**self).put(key, value)
    }

    fn forget(&self, key: &str) -> GatewayResult<()> {
        (**self).forget(key)
    }

    fn put_if_absent(&self, key: &str, value: JsonValue) -> GatewayResult<bool> {
        (**self).put_if_absent(key, value)
    }
}

/// Get-or-compute: return the cached value for `key`, or compute, store and
/// return it.
///
/// A cached value that no longer decodes as `T` is recomputed and
/// overwritten. Compute errors are returned and nothing is cached.
pub fn remember<T, F>(cache: &dyn CacheStore, key: &str, compute: F) -> GatewayResult<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> GatewayResult<T>,
{
    if let Some(value) = cached(cache, key)? {
        return Ok(value);
    }

    let value = compute()?;
    cache.put(key, encode(key, &value)?)?;
    Ok(value)
}

/// Like [`remember`], but the stored entry only survives while the token
/// under `version_key` is unchanged.
///
/// The token is read (or minted) before `compute` runs. If it no longer
/// matches once the value is stored, a purge ran in between and the entry is
/// forgotten again; the computed value is still returned to this caller.
pub fn remember_versioned<T, F>(
    cache: &dyn CacheStore,
    key: &str,
    version_key: &str,
    compute: F,
) -> GatewayResult<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> GatewayResult<T>,
{
    let version = current_version(cache, version_key)?;
    if let Some(value) = cached(cache, key)? {
        return Ok(value);
    }

    let value = compute()?;
    cache.put(key, encode(key, &value)?)?;
    if !version_is(cache, version_key, &version)? {
        tracing::debug!(key, "version moved while computing; entry retracted");
        cache.forget(key)?;
    }
    Ok(value)
}

/// Token stored under `version_key`, minting one when the key is vacant.
///
/// Minting goes through [`CacheStore::put_if_absent`], so concurrent callers
/// agree on a single token.
pub fn current_version(cache: &dyn CacheStore, version_key: &str) -> GatewayResult<String> {
    loop {
        match cache.get(version_key)? {
            Some(JsonValue::String(token)) => return Ok(token),
            Some(other) => {
                tracing::warn!(key = version_key, found = %other, "replacing malformed version token");
                let minted = Uuid::now_v7().to_string();
                cache.put(version_key, JsonValue::String(minted.clone()))?;
                return Ok(minted);
            }
            None => {
                let minted = Uuid::now_v7().to_string();
                if cache.put_if_absent(version_key, JsonValue::String(minted.clone()))? {
                    return Ok(minted);
                }
            }
        }
    }
}

/// Whether `version_key` still holds `token`. A vacant key never matches.
pub fn version_is(cache: &dyn CacheStore, version_key: &str, token: &str) -> GatewayResult<bool> {
    Ok(matches!(cache.get(version_key)?, Some(JsonValue::String(current)) if current == token))
}

fn cached<T: DeserializeOwned>(cache: &dyn CacheStore, key: &str) -> GatewayResult<Option<T>> {
    let Some(raw) = cache.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_value::<T>(raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!(key, error = %e, "discarding undecodable cache entry");
            Ok(None)
        }
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> GatewayResult<JsonValue> {
    serde_json::to_value(value)
        .map_err(|e| GatewayError::store(format!("cache encode failed for '{key}': {e}")))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn computes_once_then_serves_cached_value() {
        let cache = InMemoryCacheStore::new();
        let calls = Cell::new(0);

        for _ in 0..3 {
            let value: Vec<String> = remember(&cache, "names", || {
                calls.set(calls.get() + 1);
                Ok(vec!["db".to_string()])
            })
            .unwrap();
            assert_eq!(value, vec!["db".to_string()]);
        }

        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn forget_forces_recompute() {
        let cache = InMemoryCacheStore::new();
        let first: u32 = remember(&cache, "n", || Ok(1)).unwrap();
        cache.forget("n").unwrap();
        let second: u32 = remember(&cache, "n", || Ok(2)).unwrap();
        assert_eq!((first, second), (1, 2));
    }

    #[test]
    fn compute_errors_are_not_cached() {
        let cache = InMemoryCacheStore::new();
        let err = remember::<u32, _>(&cache, "n", || Err(GatewayError::not_found("n"))).unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
        assert_eq!(cache.get("n").unwrap(), None);
    }

    #[test]
    fn undecodable_entries_are_replaced() {
        let cache = InMemoryCacheStore::new();
        cache.put("n", serde_json::json!("not a number")).unwrap();
        let value: u32 = remember(&cache, "n", || Ok(7)).unwrap();
        assert_eq!(value, 7);
        assert_eq!(cache.get("n").unwrap(), Some(serde_json::json!(7)));
    }

    #[test]
    fn current_version_is_stable_until_forgotten() {
        let cache = InMemoryCacheStore::new();
        let first = current_version(&cache, "v").unwrap();
        assert_eq!(current_version(&cache, "v").unwrap(), first);
        assert!(version_is(&cache, "v", &first).unwrap());

        cache.forget("v").unwrap();
        assert!(!version_is(&cache, "v", &first).unwrap());
        assert_ne!(current_version(&cache, "v").unwrap(), first);
    }

    #[test]
    fn malformed_version_token_is_replaced() {
        let cache = InMemoryCacheStore::new();
        cache.put("v", serde_json::json!(42)).unwrap();
        let token = current_version(&cache, "v").unwrap();
        assert!(version_is(&cache, "v", &token).unwrap());
    }

    #[test]
    fn versioned_entry_is_retracted_when_purged_mid_compute() {
        let cache = InMemoryCacheStore::new();
        let value: u32 = remember_versioned(&cache, "n", "v", || {
            cache.forget("v")?;
            cache.forget("n")?;
            Ok(1)
        })
        .unwrap();

        assert_eq!(value, 1);
        assert_eq!(cache.get("n").unwrap(), None);

        let value: u32 = remember_versioned(&cache, "n", "v", || Ok(2)).unwrap();
        assert_eq!(value, 2);
        assert_eq!(cache.get("n").unwrap(), Some(serde_json::json!(2)));
    }

    #[test]
    fn put_if_absent_keeps_the_first_value() {
        let cache = InMemoryCacheStore::new();
        assert!(cache.put_if_absent("k", serde_json::json!("a")).unwrap());
        assert!(!cache.put_if_absent("k", serde_json::json!("b")).unwrap());
        assert_eq!(cache.get("k").unwrap(), Some(serde_json::json!("a")));
    }
}

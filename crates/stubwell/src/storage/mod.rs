//! Key-value storage abstraction.
//!
//! The store is the single source of truth for stub definitions, history
//! lists, and transaction mappings. The trait is intentionally synchronous:
//! operations run on a blocking client with connection pooling, which keeps
//! the call sites free of async bridging concerns.

mod memory;
#[cfg(feature = "redis-backend")]
mod redis;

pub use memory::InMemoryStore;
#[cfg(feature = "redis-backend")]
pub use redis::RedisStore;

use anyhow::Result;
use std::sync::Arc;

/// Backend-agnostic key-value store with expiring keys, list, and hash
/// primitives. Values travel as JSON-encoded strings.
pub trait KvStore: Send + Sync {
    /// Get a string value.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a string value with no expiry.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Set a string value that expires after `ttl_seconds`.
    fn set_ex(&self, key: &str, value: &str, ttl_seconds: i64) -> Result<()>;

    /// Delete a key (any type). No-op if absent.
    fn del(&self, key: &str) -> Result<()>;

    /// Whether a key exists.
    fn exists(&self, key: &str) -> Result<bool>;

    /// (Re)set the TTL on an existing key.
    fn expire(&self, key: &str, ttl_seconds: i64) -> Result<()>;

    /// Push a value to the front of a list.
    fn lpush(&self, key: &str, value: &str) -> Result<()>;

    /// Trim a list to the inclusive index range [start, stop].
    fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<()>;

    /// Read the inclusive index range [start, stop] of a list.
    fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;

    /// Set a hash field.
    fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;

    /// Get a hash field.
    fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// Delete a hash field. No-op if absent.
    fn hdel(&self, key: &str, field: &str) -> Result<()>;

    /// All (field, value) pairs of a hash.
    fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>>;

    /// Whether a hash field exists.
    fn hexists(&self, key: &str, field: &str) -> Result<bool>;

    /// Enumerate keys matching a glob pattern (`*` wildcard only).
    fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Liveness check. Called once at startup; the process must not begin
    /// serving if this fails.
    fn ping(&self) -> Result<()>;
}

/// Glob matching for `keys()`: `*` matches any run of characters, everything
/// else is literal. Mirrors the subset of Redis KEYS patterns the key
/// builder emits.
pub(crate) fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }
    let mut rest = key;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    // Pattern ended with '*'
    true
}

/// Backend selection for the composition root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    InMemory,
    Redis,
}

/// Create a store from configuration. Redis requires the `redis-backend`
/// feature; the in-memory store is meant for development and tests.
pub fn create_store(
    backend: Backend,
    url: &str,
    pool_size: usize,
) -> Result<Arc<dyn KvStore>> {
    match backend {
        Backend::InMemory => {
            tracing::info!("Using in-memory store");
            Ok(Arc::new(InMemoryStore::new()))
        }
        Backend::Redis => {
            #[cfg(feature = "redis-backend")]
            {
                let store = RedisStore::new(url, pool_size)?;
                tracing::info!("Using Redis store (url={url}, pool_size={pool_size})");
                Ok(Arc::new(store))
            }
            #[cfg(not(feature = "redis-backend"))]
            {
                let _ = (url, pool_size);
                Err(anyhow::anyhow!(
                    "Redis backend not available. Compile with --features redis-backend"
                ))
            }
        }
    }
}

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("missing key")]
    Missing,
    #[error("value is not a counter")]
    NotCounter,
    #[error("backend: {0}")]
    Backend(String),
}

/// Key-value cache with the memcached-style primitives the dashboard and the
/// rate limiter need. `incr` must be atomic in every implementation; callers
/// never read-modify-write counters themselves.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;
    /// `ttl = None` means no expiry.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>);
    /// Insert only if the key is absent. Returns true when the value was stored.
    async fn add(&self, key: &str, value: Value, ttl: Option<Duration>) -> bool;
    /// Atomically increment an integer value, keeping its TTL.
    async fn incr(&self, key: &str) -> Result<i64, CacheError>;
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Process-local cache backend. Atomicity of `add`/`incr` comes from the
/// DashMap entry API, which holds the shard lock for the whole operation.
#[derive(Default)]
pub struct InMemoryCache {
    entries: DashMap<String, Entry>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Option<Value> {
        // The read guard must be gone before we touch the map again; a remove
        // under a live `Ref` on the same shard deadlocks.
        {
            if let Some(e) = self.entries.get(key) {
                if !e.expired() {
                    return Some(e.value.clone());
                }
            }
        }
        self.entries.remove_if(key, |_, e| e.expired());
        None
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let entry = Entry { value, expires_at: ttl.map(|d| Instant::now() + d) };
        self.entries.insert(key.to_string(), entry);
    }

    async fn add(&self, key: &str, value: Value, ttl: Option<Duration>) -> bool {
        let mut inserted = false;
        let mut slot = self.entries.entry(key.to_string()).or_insert_with(|| {
            inserted = true;
            Entry { value: value.clone(), expires_at: ttl.map(|d| Instant::now() + d) }
        });
        if !inserted && slot.expired() {
            *slot = Entry { value, expires_at: ttl.map(|d| Instant::now() + d) };
            inserted = true;
        }
        inserted
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        {
            let mut slot = self.entries.get_mut(key).ok_or(CacheError::Missing)?;
            if !slot.expired() {
                let current = slot.value.as_i64().ok_or(CacheError::NotCounter)?;
                let next = current + 1;
                slot.value = Value::from(next);
                return Ok(next);
            }
        }
        self.entries.remove_if(key, |_, e| e.expired());
        Err(CacheError::Missing)
    }
}

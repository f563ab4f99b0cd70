//! Cache provider contract and the in-memory implementation.

use crate::errors::CacheError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Pluggable storage behind the cache strategy.
///
/// Either operation may fail; the cache strategy isolates those
/// failures from the call outcome.
#[async_trait]
pub trait CacheProvider<T>: Send + Sync {
    /// Looks up a value. `Ok(None)` is a miss; absence is distinct from
    /// a stored default value.
    async fn try_get(&self, key: &str) -> Result<Option<T>, CacheError>;

    /// Stores a value with the given time to live.
    async fn put(&self, key: &str, value: T, ttl: Duration) -> Result<(), CacheError>;
}

struct Entry<T> {
    value: T,
    expires_at: Instant,
}

/// In-memory provider with expiry enforced on read.
#[derive(Default)]
pub struct MemoryCache<T> {
    entries: DashMap<String, Entry<T>>,
}

impl<T> MemoryCache<T> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns the number of live and expired entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entries are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl<T> CacheProvider<T> for MemoryCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn try_get(&self, key: &str) -> Result<Option<T>, CacheError> {
        if let Some(entry) = self.entries.get(key) {
            if Instant::now() < entry.expires_at {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Evict lazily so an expired entry does not linger.
        self.entries
            .remove_if(key, |_, entry| Instant::now() >= entry.expires_at);
        Ok(None)
    }

    async fn put(&self, key: &str, value: T, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}

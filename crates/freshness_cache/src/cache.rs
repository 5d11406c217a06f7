//! FreshnessCache - TTL store with stale-on-error fallback

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use observability::{record_cache_lookup, CacheLookup};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Value returned by [`FreshnessCache::ensure`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cached<V, E> {
    /// Within its TTL, either served from the store or just fetched
    Fresh(V),
    /// Refresh failed; `value` is the last one stored, past its TTL
    Stale { value: V, error: E },
}

impl<V, E> Cached<V, E> {
    pub fn value(&self) -> &V {
        match self {
            Cached::Fresh(value) | Cached::Stale { value, .. } => value,
        }
    }

    pub fn into_value(self) -> V {
        match self {
            Cached::Fresh(value) | Cached::Stale { value, .. } => value,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Cached::Stale { .. })
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    fetched_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < self.ttl
    }
}

/// Per-key fetch gate; holders of the lock own the in-flight fetch
type FetchGate = Arc<tokio::sync::Mutex<()>>;

/// TTL cache shared by concurrent callers
///
/// Entries are replaced wholesale on refresh. When the store is full the
/// expired entries are dropped first, then the entry fetched longest ago.
pub struct FreshnessCache<K, V> {
    name: String,
    capacity: usize,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    gates: Mutex<HashMap<K, FetchGate>>,
}

impl<K, V> FreshnessCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty cache holding at most `capacity` entries
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Cache name (used for logging/metrics)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fresh value for `key`, `None` if absent or expired
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        self.entries()
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.value.clone())
    }

    /// Store `value` under `key`, stamped now
    pub fn insert(&self, key: K, value: V, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries();

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            entries.retain(|_, entry| entry.is_fresh(now));
            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.fetched_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                    debug!(cache = %self.name, "evicted oldest entry");
                }
            }
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                fetched_at: now,
                ttl,
            },
        );
    }

    /// Return the fresh value, or fetch and store a new one
    ///
    /// On fetch failure the last stored value is returned as
    /// [`Cached::Stale`] regardless of its age; the error only propagates
    /// when nothing was ever stored for `key`.
    pub async fn ensure<F, Fut, E>(
        &self,
        key: K,
        ttl: Duration,
        fetcher: F,
    ) -> Result<Cached<V, E>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: std::fmt::Display,
    {
        if let Some(value) = self.get(&key) {
            record_cache_lookup(&self.name, CacheLookup::Hit);
            return Ok(Cached::Fresh(value));
        }

        let gate = self.gate(&key);
        let result = {
            let _in_flight = gate.lock().await;

            // another caller may have refreshed the entry while we waited
            if let Some(value) = self.get(&key) {
                record_cache_lookup(&self.name, CacheLookup::Hit);
                Ok(Cached::Fresh(value))
            } else {
                self.refresh(key.clone(), ttl, fetcher).await
            }
        };

        self.release_gate(&key, gate);
        result
    }

    async fn refresh<F, Fut, E>(
        &self,
        key: K,
        ttl: Duration,
        fetcher: F,
    ) -> Result<Cached<V, E>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: std::fmt::Display,
    {
        match fetcher().await {
            Ok(value) => {
                self.insert(key, value.clone(), ttl);
                record_cache_lookup(&self.name, CacheLookup::Fetched);
                Ok(Cached::Fresh(value))
            }
            Err(error) => {
                let last_known = self.entries().get(&key).map(|entry| entry.value.clone());
                match last_known {
                    Some(value) => {
                        warn!(cache = %self.name, error = %error, "fetch failed, serving stale value");
                        record_cache_lookup(&self.name, CacheLookup::Stale);
                        Ok(Cached::Stale { value, error })
                    }
                    None => {
                        warn!(cache = %self.name, error = %error, "fetch failed, no cached value");
                        record_cache_lookup(&self.name, CacheLookup::Failed);
                        Err(error)
                    }
                }
            }
        }
    }

    /// Drop the entry for `key`
    pub fn invalidate(&self, key: &K) -> bool {
        self.entries().remove(key).is_some()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now));
        before - entries.len()
    }

    /// Number of stored entries, fresh or not
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gate(&self, key: &K) -> FetchGate {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(gates.entry(key.clone()).or_default())
    }

    fn release_gate(&self, key: &K, gate: FetchGate) {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        // the map and `gate` are the last two owners
        if Arc::strong_count(&gate) == 2 {
            gates.remove(key);
        }
    }
}

//! Shared memo used by every [`ResolutionContext`](crate::resolver::ResolutionContext) spawned
//! from one resolve call, and optionally across resolve calls.
//!
//! Besides finished values the cache holds in-flight computations. Callers asking for a key whose
//! computation has not finished yet await the same [`Shared`] future instead of starting another
//! one, so a remote document referenced from many places is fetched once.

use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::HashMap,
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use crate::error::ResolverError;

type PendingValue<V> = Shared<BoxFuture<'static, Result<V, ResolverError>>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

enum Slot<V: Clone> {
    Ready(V),
    Pending(PendingValue<V>),
}

struct Entry<V: Clone> {
    slot: Slot<V>,
    inserted: Instant,
}

struct CacheInner<V: Clone> {
    entries: HashMap<String, Entry<V>>,
    stats: CacheStats,
}

enum Found<V: Clone> {
    Ready(V),
    Pending(PendingValue<V>),
}

/// Key/value memo with hit and miss counters. Cloning yields another handle onto the same store.
pub struct Cache<V: Clone = Value> {
    inner: Arc<Mutex<CacheInner<V>>>,
    ttl: Option<Duration>,
}

impl<V: Clone> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Cache {
            inner: self.inner.clone(),
            ttl: self.ttl,
        }
    }
}

impl<V: Clone + Send + Sync + 'static> Default for Cache<V> {
    fn default() -> Self {
        Cache::new()
    }
}

impl<V: Clone> std::fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Cache")
            .field("entries", &inner.entries.len())
            .field("stats", &inner.stats)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl<V: Clone + Send + Sync + 'static> Cache<V> {
    pub fn new() -> Self {
        Cache {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::new(),
                stats: CacheStats::default(),
            })),
            ttl: None,
        }
    }

    /// Finished values older than `ttl` read as misses.
    pub fn with_ttl(ttl: Duration) -> Self {
        Cache {
            ttl: Some(ttl),
            ..Cache::new()
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    fn is_fresh(&self, entry: &Entry<V>) -> bool {
        match (&entry.slot, self.ttl) {
            (Slot::Ready(_), Some(ttl)) => entry.inserted.elapsed() < ttl,
            _ => true,
        }
    }

    /// A finished, unexpired value. In-flight computations read as misses here.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock();
        let value = inner
            .entries
            .get(key)
            .filter(|entry| self.is_fresh(entry))
            .and_then(|entry| match &entry.slot {
                Slot::Ready(value) => Some(value.clone()),
                Slot::Pending(_) => None,
            });
        if value.is_some() {
            inner.stats.hits += 1;
        } else {
            inner.stats.misses += 1;
        }
        value
    }

    pub fn set(&self, key: &str, value: V) {
        let mut inner = self.inner.lock();
        inner.entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::Ready(value),
                inserted: Instant::now(),
            },
        );
    }

    /// True for any entry, finished or in flight. Does not touch the counters.
    pub fn has(&self, key: &str) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Drop every entry and reset the counters.
    pub fn purge(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.stats = CacheStats::default();
    }

    /// Return the value for `key`, computing it with `init` on a miss.
    ///
    /// While the computation runs, further callers for the same key await it rather than calling
    /// their own `init`. A successful outcome is kept as a finished value; a failure is handed to
    /// every waiting caller and then forgotten so a later call can retry.
    pub async fn get_or_try_insert_with<F, Fut>(&self, key: &str, init: F) -> Result<V, ResolverError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ResolverError>> + Send + 'static,
    {
        let pending = {
            let mut inner = self.inner.lock();
            let found = inner
                .entries
                .get(key)
                .filter(|entry| self.is_fresh(entry))
                .map(|entry| match &entry.slot {
                    Slot::Ready(value) => Found::Ready(value.clone()),
                    Slot::Pending(pending) => Found::Pending(pending.clone()),
                });
            match found {
                Some(Found::Ready(value)) => {
                    inner.stats.hits += 1;
                    tracing::debug!("[Cache] hit for {key}");
                    return Ok(value);
                }
                Some(Found::Pending(pending)) => {
                    inner.stats.hits += 1;
                    tracing::debug!("[Cache] joining in-flight computation for {key}");
                    pending
                }
                None => {
                    inner.stats.misses += 1;
                    tracing::debug!("[Cache] miss for {key}");
                    let pending = init().boxed().shared();
                    inner.entries.insert(
                        key.to_string(),
                        Entry {
                            slot: Slot::Pending(pending.clone()),
                            inserted: Instant::now(),
                        },
                    );
                    pending
                }
            }
        };

        let outcome = pending.await;

        let mut inner = self.inner.lock();
        let still_pending = inner
            .entries
            .get(key)
            .is_some_and(|entry| matches!(entry.slot, Slot::Pending(_)));
        if still_pending {
            match &outcome {
                Ok(value) => {
                    inner.entries.insert(
                        key.to_string(),
                        Entry {
                            slot: Slot::Ready(value.clone()),
                            inserted: Instant::now(),
                        },
                    );
                }
                Err(e) => {
                    tracing::debug!("[Cache] forgetting failed computation for {key}: {e}");
                    inner.entries.remove(key);
                }
            }
        }
        outcome
    }
}

//! Bounded in-process cache of records keyed by id.
//!
//! The cache is a read-through accelerator, never the system of record: a
//! miss always falls back to the backend and the whole cache can be cleared
//! at any time without losing data.

use std::time::Instant;

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Vector;
use crate::record::VectorRecord;

/// What happens when a new id would push the cache over capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Evict the single least-recently-used entry.
    #[default]
    Lru,
    /// Drop every entry. Cheaper bookkeeping, worse hit rate after overflow.
    ClearOnOverflow,
}

/// A cached record, as returned by [`BoundedCache::peek`].
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub id: String,

    /// The embedding, stored apart from the snapshot.
    pub vector: Vector,

    /// The record without its vector.
    pub record: VectorRecord,

    /// Refreshed on every read or overwrite.
    pub last_accessed: Instant,
}

impl CacheEntry {
    fn new(id: String, mut record: VectorRecord) -> Self {
        let vector = std::mem::take(&mut record.vector);
        record.score = None;
        Self {
            id,
            vector,
            record,
            last_accessed: Instant::now(),
        }
    }

    fn to_record(&self) -> VectorRecord {
        let mut record = self.record.clone();
        record.vector = self.vector.clone();
        record
    }
}

/// Statistics about the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Inner {
    entries: LruCache<String, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Fixed-capacity, access-ordered record cache.
///
/// Safe to share between concurrent callers; every operation takes a short
/// mutex and never performs I/O. A capacity of `0` disables caching.
pub struct BoundedCache {
    inner: Mutex<Inner>,
    capacity: usize,
    policy: EvictionPolicy,
}

impl BoundedCache {
    /// Create an LRU cache.
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, EvictionPolicy::Lru)
    }

    /// Create a cache with an explicit eviction policy. The policy is fixed
    /// for the lifetime of the cache.
    pub fn with_policy(capacity: usize, policy: EvictionPolicy) -> Self {
        Self {
            inner: Mutex::new(Inner {
                // Capacity is enforced in `put` so both policies share one map.
                entries: LruCache::unbounded(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            capacity,
            policy,
        }
    }

    /// Look up a record, marking it most recently used on a hit.
    pub fn get(&self, id: &str) -> Option<VectorRecord> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let found = inner.entries.get_mut(id).map(|entry| {
            entry.last_accessed = Instant::now();
            entry.to_record()
        });
        if found.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        found
    }

    /// Insert or overwrite a record.
    pub fn put(&self, id: impl Into<String>, record: VectorRecord) {
        if self.capacity == 0 {
            return;
        }

        let id = id.into();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if !inner.entries.contains(&id) && inner.entries.len() >= self.capacity {
            match self.policy {
                EvictionPolicy::Lru => {
                    if let Some((evicted, _)) = inner.entries.pop_lru() {
                        inner.evictions += 1;
                        debug!("Evicted least recently used entry: {evicted}");
                    }
                }
                EvictionPolicy::ClearOnOverflow => {
                    let dropped = inner.entries.len() as u64;
                    inner.entries.clear();
                    inner.evictions += dropped;
                    debug!("Cache overflow, cleared {dropped} entries");
                }
            }
        }

        let entry = CacheEntry::new(id.clone(), record);
        inner.entries.put(id, entry);
    }

    /// Remove a record, returning whether it was cached.
    pub fn remove(&self, id: &str) -> bool {
        self.inner.lock().entries.pop(id).is_some()
    }

    /// Inspect a cached entry without touching recency or hit counters.
    pub fn peek(&self, id: &str) -> Option<CacheEntry> {
        self.inner.lock().entries.peek(id).cloned()
    }

    /// Whether a record is cached. Does not affect recency.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().entries.contains(id)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.entries.len();
        inner.entries.clear();
        info!("Cleared record cache ({dropped} entries)");
    }

    /// Number of cached records.
    pub fn size(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            capacity: self.capacity,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }
}

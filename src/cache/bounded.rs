//! Bounded Cache - Thread-safe LRU
//!
//! A single mutex around [`LruCache`]. Critical sections are a hash lookup
//! plus a few pointer swaps and never span I/O, so one lock is enough.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use super::byteview::ByteView;
use super::lru::LruCache;

/// Thread-safe, size-bounded LRU cache of [`ByteView`]s
pub struct BoundedCache {
    lru: Mutex<LruCache>,
    /// Lookup count
    gets: AtomicU64,
    /// Hit count
    hits: AtomicU64,
}

impl BoundedCache {
    /// Create a cache bounded to `cache_bytes` (`<= 0` for no limit)
    pub fn new(cache_bytes: i64) -> Self {
        Self {
            lru: Mutex::new(LruCache::new(cache_bytes)),
            gets: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    /// Get a value, refreshing its recency
    pub fn get(&self, key: &str) -> Option<ByteView> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        let value = self.lru.lock().get(key);
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Like [`get`](Self::get) but without touching the lookup counters, for
    /// a second look at a key the caller has already counted
    pub fn get_uncounted(&self, key: &str) -> Option<ByteView> {
        self.lru.lock().get(key)
    }

    /// Add or update a value, evicting as needed
    pub fn add(&self, key: &str, value: ByteView) {
        self.lru.lock().add(key, value);
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.lru.lock().len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.lru.lock().is_empty()
    }

    /// Bytes currently held
    pub fn bytes(&self) -> i64 {
        self.lru.lock().bytes()
    }

    /// Configured capacity
    pub fn capacity(&self) -> i64 {
        self.lru.lock().max_bytes()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let lru = self.lru.lock();
        CacheStats {
            bytes: lru.bytes(),
            items: lru.len() as u64,
            gets: self.gets.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            evictions: lru.evictions(),
        }
    }
}

impl std::fmt::Debug for BoundedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedCache")
            .field("lru", &*self.lru.lock())
            .finish()
    }
}

/// Bounded cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Bytes currently held
    pub bytes: i64,
    /// Number of entries
    pub items: u64,
    /// Lookup count
    pub gets: u64,
    /// Hit count
    pub hits: u64,
    /// Eviction count
    pub evictions: u64,
}

impl CacheStats {
    /// Hit ratio (0.0 - 1.0)
    pub fn hit_ratio(&self) -> f64 {
        if self.gets == 0 {
            0.0
        } else {
            self.hits as f64 / self.gets as f64
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Group Statistics

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Per-group counters
#[derive(Debug, Default)]
pub struct GroupStats {
    gets: AtomicU64,
    cache_hits: AtomicU64,
    peer_loads: AtomicU64,
    peer_errors: AtomicU64,
    loads: AtomicU64,
    loads_deduped: AtomicU64,
    local_loads: AtomicU64,
    local_load_errs: AtomicU64,
    server_requests: AtomicU64,
}

impl GroupStats {
    pub fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_peer_load(&self) {
        self.peer_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_peer_error(&self) {
        self.peer_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// A miss that entered the coalescer
    pub fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    /// A load that actually executed after coalescing
    pub fn record_load_deduped(&self) {
        self.loads_deduped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_local_load(&self) {
        self.local_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_local_load_err(&self) {
        self.local_load_errs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_server_request(&self) {
        self.server_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> GroupStatsSnapshot {
        GroupStatsSnapshot {
            gets: self.gets.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            peer_loads: self.peer_loads.load(Ordering::Relaxed),
            peer_errors: self.peer_errors.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            loads_deduped: self.loads_deduped.load(Ordering::Relaxed),
            local_loads: self.local_loads.load(Ordering::Relaxed),
            local_load_errs: self.local_load_errs.load(Ordering::Relaxed),
            server_requests: self.server_requests.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of [`GroupStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GroupStatsSnapshot {
    /// Calls to `Group::get`, including rejected ones
    pub gets: u64,
    /// Lookups answered from the main or hot cache
    pub cache_hits: u64,
    /// Values fetched from the owning peer
    pub peer_loads: u64,
    /// Failed peer fetches (each followed by a local load)
    pub peer_errors: u64,
    /// Misses that entered the coalescer
    pub loads: u64,
    /// Loads that actually executed after coalescing
    pub loads_deduped: u64,
    /// Successful loader invocations
    pub local_loads: u64,
    /// Failed loader invocations
    pub local_load_errs: u64,
    /// Requests served to other peers
    pub server_requests: u64,
}

impl GroupStatsSnapshot {
    /// Field name and value pairs, in declaration order
    pub fn counters(&self) -> [(&'static str, u64); 9] {
        [
            ("gets", self.gets),
            ("cache_hits", self.cache_hits),
            ("peer_loads", self.peer_loads),
            ("peer_errors", self.peer_errors),
            ("loads", self.loads),
            ("loads_deduped", self.loads_deduped),
            ("local_loads", self.local_loads),
            ("local_load_errs", self.local_load_errs),
            ("server_requests", self.server_requests),
        ]
    }
}

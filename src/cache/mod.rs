//! Local Cache Storage
//!
//! Per-group, size-bounded storage of immutable values.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              BoundedCache                │
//! │   Mutex ──▶ LruCache                     │
//! │             ┌────────────────────────┐   │
//! │  index ───▶ │ MRU ◀──▶ ... ◀──▶ LRU  │   │
//! │             └────────────────────────┘   │
//! └──────────────────────────────────────────┘
//! ```
//!
//! Capacity is a soft target: an insert always lands, then the least
//! recently used entries are evicted until the total fits again.

mod bounded;
mod byteview;
mod lru;

pub use bounded::{BoundedCache, CacheStats};
pub use byteview::ByteView;
pub use lru::LruCache;

/// Default per-group capacity (2 KiB, enough for the demo data set)
pub const DEFAULT_CACHE_BYTES: i64 = 2 << 10;

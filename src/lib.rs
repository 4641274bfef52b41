//! Peercache - Distributed Read-Through Cache
//!
//! A library for caching the results of an expensive lookup across a set of
//! cooperating nodes. Each key has one owning node, chosen by a consistent
//! hash ring; any node can be asked for any key and forwards the miss to the
//! owner, which loads it once from the source of truth and keeps it.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//!   client ──────▶│ ApiServer ─▶ Group ─▶ BoundedCache (LRU)     │
//!                 │                │                             │
//!                 │                ├─▶ RequestCoalescer          │
//!                 │                ├─▶ HttpPool ─▶ HashRing      │
//!                 │                │      └─▶ HttpGetter ────────┼──▶ peer
//!                 │                └─▶ Loader (source of truth)  │
//!   peer ────────▶│ PeerServer ─▶ Registry ─▶ Group              │
//!                 └──────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`api`] - Client-facing HTTP server
//! - [`cache`] - Byte views and the size-bounded LRU cache
//! - [`error`] - Error types
//! - [`flight`] - Duplicate load suppression
//! - [`group`] - Cache namespaces, loaders and the group registry
//! - [`metrics`] - Prometheus exposition
//! - [`peers`] - Peer selection and the HTTP peer protocol
//! - [`ring`] - Consistent hashing

pub mod api;
pub mod cache;
pub mod error;
pub mod flight;
pub mod group;
pub mod metrics;
pub mod peers;
pub mod ring;

// Re-export commonly used types
pub use api::ApiServer;
pub use cache::ByteView;
pub use error::{BoxError, Error, Result};
pub use flight::RequestCoalescer;
pub use group::{Group, Loader, Registry};
pub use peers::{HttpPool, PeerGetter, PeerPicker, PeerServer, PoolConfig};
pub use ring::HashRing;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

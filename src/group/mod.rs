//! Groups
//!
//! A [`Group`] is a named cache namespace: its own byte budget, its own
//! loader, and (once peers are registered) its own view of who owns which
//! key. Groups are registered in a [`Registry`] so the peer server can find
//! them by the name carried in a request.
//!
//! # Lookup
//!
//! ```text
//!              ┌──────────┐  hit
//!   get ──────▶│  caches  │─────────────────────────────▶ Ok(value)
//!              └────┬─────┘
//!                   │ miss
//!              ┌────▼─────┐  waiter
//!              │coalescer │─────────────▶ executor's outcome
//!              └────┬─────┘
//!                   │ executor
//!              ┌────▼─────┐  remote owner, ok
//!              │  peers   │─────────────────────────────▶ Ok(value)
//!              └────┬─────┘
//!                   │ local owner / no peers / peer error
//!              ┌────▼─────┐  ok: populate main cache
//!              │  loader  │─────────────────────────────▶ Ok(value)
//!              └──────────┘  err ───────────────────────▶ Err (not cached)
//! ```

#[allow(clippy::module_inception)]
mod group;
mod loader;
mod registry;
mod stats;

pub use group::Group;
pub use loader::{LoadResult, Loader};
pub use registry::Registry;
pub use stats::{GroupStats, GroupStatsSnapshot};

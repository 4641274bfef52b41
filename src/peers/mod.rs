//! Peer Protocol
//!
//! How a group reaches the node that owns a key.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                           Group                              │
//! │             pick_peer(key)          fetch(group, key)        │
//! │                  │                         │                 │
//! │  ┌───────────────▼──────────┐   ┌──────────▼──────────────┐  │
//! │  │   PeerPicker (trait)     │   │   PeerGetter (trait)    │  │
//! │  └───────────────┬──────────┘   └──────────┬──────────────┘  │
//! └──────────────────┼─────────────────────────┼─────────────────┘
//!                    ▼                         ▼
//!        HttpPool (HashRing)  ──owns──▶  HttpGetter (reqwest)
//!                                              │  GET /_peercache/<group>/<key>
//!                                              ▼
//!                                   PeerServer (hyper) on the owner
//! ```
//!
//! Any fetch failure is a cue for the caller to load locally; it is never
//! surfaced to the end caller.

mod client;
mod pool;
mod server;
pub mod wire;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

pub use client::HttpGetter;
pub use pool::{HttpPool, PoolConfig};
pub use server::{status_for, PeerServer};

/// Chooses the peer that owns a key
pub trait PeerPicker: Send + Sync {
    /// Owning peer for `key`, or `None` when this node owns it (or no peers
    /// are known) and the value should be loaded locally.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>>;
}

/// Fetches values from one remote peer
#[async_trait]
pub trait PeerGetter: Send + Sync {
    /// Peer identity (base URL)
    fn peer_id(&self) -> &str;

    /// Fetch `key` from `group` on the peer
    async fn fetch(&self, group: &str, key: &str) -> Result<Bytes>;
}

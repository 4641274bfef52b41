//! Peer Pool - ring-backed peer selection
//!
//! Holds this node's view of the peer set: a [`HashRing`] plus one
//! [`HttpGetter`] per remote peer. Membership can be replaced wholesale
//! ([`HttpPool::set_peers`]) or changed incrementally
//! ([`HttpPool::add_peers`], [`HttpPool::remove_peer`]).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::Client;
use tracing::{debug, info};

use super::client::HttpGetter;
use super::wire::DEFAULT_BASE_PATH;
use super::{PeerGetter, PeerPicker};
use crate::error::{Error, Result};
use crate::ring::{HashRing, DEFAULT_REPLICAS};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a peer pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// URL prefix for peer requests
    pub base_path: String,

    /// Virtual ring positions per peer
    pub replicas: usize,

    /// Timeout for a single peer fetch
    pub fetch_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            replicas: DEFAULT_REPLICAS,
            fetch_timeout: Duration::from_secs(2),
        }
    }
}

// =============================================================================
// Pool
// =============================================================================

struct PoolState {
    ring: HashRing,
    getters: HashMap<String, Arc<HttpGetter>>,
}

/// This node's peer set and HTTP clients
pub struct HttpPool {
    /// This node's own base URL, e.g. `http://10.0.0.2:8001`
    self_url: String,
    config: PoolConfig,
    client: Client,
    state: RwLock<PoolState>,
}

impl HttpPool {
    /// Create a pool for the node reachable at `self_url`
    pub fn new(self_url: impl Into<String>, config: PoolConfig) -> Result<Arc<Self>> {
        if config.base_path.is_empty()
            || !config.base_path.starts_with('/')
            || !config.base_path.ends_with('/')
        {
            return Err(Error::Config(format!(
                "base path must start and end with '/': {:?}",
                config.base_path
            )));
        }

        let self_url: String = self_url.into();
        let client = Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Arc::new(Self {
            self_url: peer_id(&self_url).to_string(),
            state: RwLock::new(PoolState {
                ring: HashRing::new(config.replicas),
                getters: HashMap::new(),
            }),
            config,
            client,
        }))
    }

    /// This node's base URL
    pub fn self_url(&self) -> &str {
        &self.self_url
    }

    /// URL prefix for peer requests
    pub fn base_path(&self) -> &str {
        &self.config.base_path
    }

    /// Replace the whole peer set
    pub fn set_peers<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.state.write();
        state.ring = HashRing::new(self.config.replicas);
        state.getters.clear();
        self.insert_peers(&mut state, peers);
        info!(peers = state.ring.len(), "peer set replaced");
    }

    /// Add peers to the current set
    pub fn add_peers<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.state.write();
        self.insert_peers(&mut state, peers);
    }

    /// Remove a peer; returns false if it was not a member
    pub fn remove_peer(&self, peer: &str) -> bool {
        let peer = peer_id(peer);
        let mut state = self.state.write();
        state.getters.remove(peer);
        let removed = state.ring.remove_peer(peer);
        if removed {
            info!(peer = %peer, "peer removed");
        }
        removed
    }

    /// Current members, sorted
    pub fn peers(&self) -> Vec<String> {
        self.state.read().ring.peers().map(str::to_string).collect()
    }

    /// Owning member for `key`, which may be this node
    pub fn owner(&self, key: &str) -> Option<String> {
        self.state.read().ring.route(key).map(str::to_string)
    }

    fn insert_peers<I, S>(&self, state: &mut PoolState, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for peer in peers {
            let peer: String = peer.into();
            let peer = peer_id(&peer).to_string();
            if state.ring.contains(&peer) {
                continue;
            }
            state.ring.add_peers([peer.clone()]);
            let getter = HttpGetter::new(
                peer.clone(),
                self.config.base_path.clone(),
                self.client.clone(),
            );
            state.getters.insert(peer.clone(), Arc::new(getter));
            debug!(peer = %peer, "peer added");
        }
    }
}

/// Canonical identity of a peer URL: `http://host:8001/` and
/// `http://host:8001` name the same node
fn peer_id(url: &str) -> &str {
    url.trim_end_matches('/')
}

impl PeerPicker for HttpPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
        let state = self.state.read();
        let owner = state.ring.route(key)?;
        if owner == self.self_url {
            return None;
        }
        debug!(key = %key, peer = %owner, "picked peer");
        state
            .getters
            .get(owner)
            .map(|getter| Arc::clone(getter) as Arc<dyn PeerGetter>)
    }
}

impl std::fmt::Debug for HttpPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPool")
            .field("self_url", &self.self_url)
            .field("config", &self.config)
            .field("peers", &self.state.read().ring.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

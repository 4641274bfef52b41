//! Consistent-Hash Peer Routing
//!
//! Maps every key to exactly one peer. Each real peer owns `replicas`
//! virtual positions on a `u32` ring, placed at `hash("<i>-<peer>")`.
//! A key belongs to the first position at or after `hash(key)`, wrapping
//! to the smallest position.
//!
//! Removing one of N peers only remaps the keys that peer owned (about
//! 1/N of the keyspace).
//!
//! Routing depends only on the peer set and the hash function, never on
//! insertion order: when two virtual positions collide, the
//! lexicographically smallest peer owns the position.

mod proptest;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Hash function used to place peers and keys on the ring
pub type HashFn = Arc<dyn Fn(&[u8]) -> u32 + Send + Sync>;

/// Default number of virtual positions per peer
pub const DEFAULT_REPLICAS: usize = 50;

/// CRC-32 (IEEE), the default ring hash
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Consistent-hash ring of peer identities
#[derive(Clone)]
pub struct HashRing {
    hash: HashFn,
    replicas: usize,
    /// Ring position -> owning peers, smallest first
    positions: BTreeMap<u32, BTreeSet<String>>,
    peers: BTreeSet<String>,
}

impl HashRing {
    /// Create an empty ring using CRC-32
    pub fn new(replicas: usize) -> Self {
        Self::with_hash(replicas, Arc::new(crc32))
    }

    /// Create an empty ring with a custom hash function
    pub fn with_hash(replicas: usize, hash: HashFn) -> Self {
        Self {
            hash,
            replicas: replicas.max(1),
            positions: BTreeMap::new(),
            peers: BTreeSet::new(),
        }
    }

    /// Add peers; peers already on the ring are ignored
    pub fn add_peers<I, S>(&mut self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for peer in peers {
            let peer = peer.into();
            if !self.peers.insert(peer.clone()) {
                continue;
            }
            for i in 0..self.replicas {
                let position = self.virtual_position(i, &peer);
                self.positions
                    .entry(position)
                    .or_default()
                    .insert(peer.clone());
            }
        }
    }

    /// Remove a peer and all its virtual positions; returns false if absent
    pub fn remove_peer(&mut self, peer: &str) -> bool {
        if !self.peers.remove(peer) {
            return false;
        }
        for i in 0..self.replicas {
            let position = self.virtual_position(i, peer);
            if let Some(owners) = self.positions.get_mut(&position) {
                owners.remove(peer);
                if owners.is_empty() {
                    self.positions.remove(&position);
                }
            }
        }
        true
    }

    /// Owning peer for `key`, or `None` when the ring is empty
    pub fn route(&self, key: &str) -> Option<&str> {
        let hash = (self.hash)(key.as_bytes());
        self.positions
            .range(hash..)
            .next()
            .or_else(|| self.positions.iter().next())
            .and_then(|(_, owners)| owners.iter().next())
            .map(String::as_str)
    }

    /// Peers currently on the ring, sorted
    pub fn peers(&self) -> impl Iterator<Item = &str> {
        self.peers.iter().map(String::as_str)
    }

    /// True if `peer` is on the ring
    pub fn contains(&self, peer: &str) -> bool {
        self.peers.contains(peer)
    }

    /// Number of real peers
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// True when no peers are on the ring
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Virtual positions per peer
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    fn virtual_position(&self, replica: usize, peer: &str) -> u32 {
        (self.hash)(format!("{}-{}", replica, peer).as_bytes())
    }
}

impl std::fmt::Debug for HashRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashRing")
            .field("replicas", &self.replicas)
            .field("peers", &self.peers)
            .field("positions", &self.positions.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Hash that reads the decimal number after the last '-' (or the whole
    /// input), making ring positions predictable.
    fn numeric_hash() -> HashFn {
        Arc::new(|data: &[u8]| {
            let s = std::str::from_utf8(data).unwrap_or_default();
            let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
            digits.parse().unwrap_or(0)
        })
    }

    #[test]
    fn test_empty_ring_routes_nowhere() {
        let ring = HashRing::new(3);
        assert!(ring.route("Tom").is_none());
        assert!(ring.is_empty());
    }

    #[test]
    fn test_route_with_predictable_hash() {
        // Peers "6", "4", "2" with 3 replicas sit at
        // 06 16 26 / 04 14 24 / 02 12 22.
        let mut ring = HashRing::with_hash(3, numeric_hash());
        ring.add_peers(["6", "4", "2"]);

        let cases = [("2", "2"), ("11", "2"), ("23", "4"), ("27", "2")];
        for (key, peer) in cases {
            assert_eq!(ring.route(key), Some(peer), "key {}", key);
        }

        // Adding "8" places 08 18 28; 27 now maps to 8.
        ring.add_peers(["8"]);
        assert_eq!(ring.route("27"), Some("8"));
        assert_eq!(ring.route("11"), Some("2"));
    }

    #[test]
    fn test_remove_peer_drops_all_positions() {
        let mut ring = HashRing::with_hash(3, numeric_hash());
        ring.add_peers(["6", "4", "2"]);
        assert!(ring.remove_peer("4"));
        assert!(!ring.remove_peer("4"));

        assert_eq!(ring.route("23"), Some("6"));
        assert_eq!(ring.route("13"), Some("6"));
        assert_eq!(ring.len(), 2);
        assert!(!ring.contains("4"));
    }

    #[test]
    fn test_duplicate_add_is_ignored() {
        let mut ring = HashRing::new(10);
        ring.add_peers(["http://a", "http://a"]);
        ring.add_peers(["http://a"]);
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.route("anything"), Some("http://a"));
    }

    #[test]
    fn test_routing_is_deterministic_across_rings() {
        let peers = ["http://10.0.0.1:8001", "http://10.0.0.2:8001", "http://10.0.0.3:8001"];
        let mut a = HashRing::new(DEFAULT_REPLICAS);
        a.add_peers(peers);
        let mut b = HashRing::new(DEFAULT_REPLICAS);
        b.add_peers(peers.iter().rev().copied());

        for i in 0..1000 {
            let key = format!("key-{}", i);
            assert_eq!(a.route(&key), b.route(&key));
            assert_eq!(a.route(&key), a.route(&key));
        }
    }

    #[test]
    fn test_collisions_resolve_independent_of_order() {
        // Every position collides.
        let constant: HashFn = Arc::new(|_| 7);
        let mut a = HashRing::with_hash(2, constant.clone());
        a.add_peers(["b", "a"]);
        let mut b = HashRing::with_hash(2, constant);
        b.add_peers(["a", "b"]);

        assert_eq!(a.route("k"), Some("a"));
        assert_eq!(b.route("k"), Some("a"));

        a.remove_peer("a");
        assert_eq!(a.route("k"), Some("b"));
    }

    #[test]
    fn test_removal_only_moves_removed_peers_keys() {
        let peers: Vec<String> = (1..=5).map(|i| format!("http://node-{}:8001", i)).collect();
        let mut ring = HashRing::new(DEFAULT_REPLICAS);
        ring.add_peers(peers.iter().cloned());

        let keys: Vec<String> = (0..5000).map(|i| format!("user:{}", i)).collect();
        let before: Vec<String> = keys
            .iter()
            .map(|k| ring.route(k).unwrap().to_string())
            .collect();

        let removed = &peers[2];
        ring.remove_peer(removed);

        let mut moved = 0;
        for (key, owner) in keys.iter().zip(&before) {
            let now = ring.route(key).unwrap();
            if owner == removed {
                assert_ne!(now, removed);
                moved += 1;
            } else {
                assert_eq!(now, owner, "key {} moved off a surviving peer", key);
            }
        }

        // Roughly 1/5 of the keyspace, with generous slack for skew.
        assert!(moved > 250 && moved < 2500, "moved {}", moved);
    }
}

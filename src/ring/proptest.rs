//! Property-Based Tests for the Hash Ring
//!
//! # Test Properties
//!
//! 1. **Order Independence**: the same peer set routes identically however
//!    it was added
//! 2. **Membership**: every routed peer is a current member
//! 3. **Stability**: removing a peer only remaps keys that peer owned
//! 4. **Re-add**: removing then re-adding a peer restores the original routing

#![cfg(test)]

use proptest::prelude::*;

use super::HashRing;

// =============================================================================
// Property Strategies
// =============================================================================

/// Strategy for a set of 1-8 distinct peer addresses.
fn peer_set_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("[a-z]{1,8}:[0-9]{2,4}", 1..=8)
        .prop_map(|set| set.into_iter().map(|p| format!("http://{}", p)).collect())
}

/// Strategy for lookup keys.
fn keys_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[A-Za-z0-9:_-]{1,24}", 1..64)
}

fn ring_of(peers: &[String], replicas: usize) -> HashRing {
    let mut ring = HashRing::new(replicas);
    ring.add_peers(peers.iter().cloned());
    ring
}

// =============================================================================
// Routing Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: routing is invariant to peer insertion order.
    #[test]
    fn prop_order_independent(
        peers in peer_set_strategy(),
        keys in keys_strategy(),
        replicas in 1usize..=32,
    ) {
        let forward = ring_of(&peers, replicas);
        let mut reversed_peers = peers.clone();
        reversed_peers.reverse();
        let reversed = ring_of(&reversed_peers, replicas);

        for key in &keys {
            prop_assert_eq!(forward.route(key), reversed.route(key));
        }
    }

    /// Property: a non-empty ring always routes to a member.
    #[test]
    fn prop_routes_to_member(
        peers in peer_set_strategy(),
        keys in keys_strategy(),
    ) {
        let ring = ring_of(&peers, 8);
        for key in &keys {
            let owner = ring.route(key);
            prop_assert!(owner.is_some());
            prop_assert!(peers.iter().any(|p| Some(p.as_str()) == owner));
        }
    }

    /// Property: removing one peer leaves every other peer's keys in place.
    #[test]
    fn prop_removal_is_minimal(
        peers in peer_set_strategy(),
        keys in keys_strategy(),
        victim in any::<prop::sample::Index>(),
    ) {
        let mut ring = ring_of(&peers, 16);
        let victim = victim.get(&peers).clone();
        let before: Vec<Option<String>> =
            keys.iter().map(|k| ring.route(k).map(str::to_string)).collect();

        ring.remove_peer(&victim);

        for (key, owner) in keys.iter().zip(before) {
            let owner = owner.unwrap();
            if owner != victim {
                prop_assert_eq!(ring.route(key), Some(owner.as_str()));
            } else {
                prop_assert_ne!(ring.route(key), Some(victim.as_str()));
            }
        }
    }

    /// Property: remove + re-add restores routing exactly.
    #[test]
    fn prop_readd_restores_routing(
        peers in peer_set_strategy(),
        keys in keys_strategy(),
        victim in any::<prop::sample::Index>(),
    ) {
        let original = ring_of(&peers, 16);
        let mut ring = original.clone();
        let victim = victim.get(&peers).clone();

        ring.remove_peer(&victim);
        ring.add_peers([victim]);

        for key in &keys {
            prop_assert_eq!(ring.route(key), original.route(key));
        }
    }
}

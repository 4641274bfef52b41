//! Group - read-through cache namespace
//!
//! ```text
//!   get(key)
//!     │ empty key ──────────────────────────────▶ Err(EmptyKey)
//!     ▼
//!   main / hot cache ── hit ────────────────────▶ value
//!     │ miss
//!     ▼
//!   coalescer (one executor per key)
//!     │
//!     ├─ owning peer is remote ─▶ fetch ── ok ──▶ value (hot cache, if enabled)
//!     │                             │ err
//!     ▼                             ▼
//!   loader ──▶ populate main cache ─────────────▶ value
//! ```

use std::sync::{Arc, OnceLock};

use tracing::{debug, instrument, warn};

use super::loader::Loader;
use super::stats::GroupStats;
use crate::cache::{BoundedCache, ByteView, CacheStats};
use crate::error::{Error, Result};
use crate::flight::RequestCoalescer;
use crate::peers::{PeerGetter, PeerPicker};

/// A named cache namespace with its own capacity, loader and routing
pub struct Group {
    name: String,
    loader: Loader,
    /// Values this node owns (or loaded itself after a peer failure)
    main_cache: BoundedCache,
    /// Values fetched from owning peers; only present when enabled
    hot_cache: Option<BoundedCache>,
    peers: OnceLock<Arc<dyn PeerPicker>>,
    flight: RequestCoalescer<Result<ByteView>>,
    stats: GroupStats,
}

impl Group {
    /// Create a group whose main cache holds up to `cache_bytes`
    /// (`<= 0` for no limit)
    pub fn new(name: impl Into<String>, cache_bytes: i64, loader: Loader) -> Self {
        Self {
            name: name.into(),
            loader,
            main_cache: BoundedCache::new(cache_bytes),
            hot_cache: None,
            peers: OnceLock::new(),
            flight: RequestCoalescer::new(),
            stats: GroupStats::default(),
        }
    }

    /// Also keep values fetched from peers, in a separate cache bounded to
    /// `cache_bytes`. Disabled by default: only the owner caches a key.
    pub fn with_hot_cache(mut self, cache_bytes: i64) -> Self {
        self.hot_cache = Some(BoundedCache::new(cache_bytes));
        self
    }

    /// Group name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach the peer picker used to route misses.
    ///
    /// # Panics
    ///
    /// Panics if a picker is already attached; that is a wiring bug, not a
    /// runtime condition.
    pub fn register_peers(&self, peers: Arc<dyn PeerPicker>) {
        if self.peers.set(peers).is_err() {
            panic!("register_peers called more than once for group {:?}", self.name);
        }
    }

    /// Read `key` through the cache
    #[instrument(skip(self), fields(group = %self.name))]
    pub async fn get(&self, key: &str) -> Result<ByteView> {
        self.stats.record_get();
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }

        if let Some(value) = self.lookup_cache(key) {
            self.stats.record_cache_hit();
            debug!("cache hit");
            return Ok(value);
        }

        self.load(key).await
    }

    async fn load(&self, key: &str) -> Result<ByteView> {
        self.stats.record_load();
        self.flight
            .execute(key, move || async move {
                // A caller that missed just before the previous load finished
                // lands here after its result is already cached.
                if let Some(value) = self.recheck_cache(key) {
                    self.stats.record_cache_hit();
                    return Ok(value);
                }
                self.stats.record_load_deduped();

                if let Some(peer) = self.peers.get().and_then(|p| p.pick_peer(key)) {
                    match self.get_from_peer(peer.as_ref(), key).await {
                        Ok(value) => {
                            self.stats.record_peer_load();
                            return Ok(value);
                        }
                        Err(e) => {
                            self.stats.record_peer_error();
                            warn!(peer = %peer.peer_id(), key = %key, error = %e, "peer fetch failed, loading locally");
                        }
                    }
                }

                self.get_locally(key).await
            })
            .await
    }

    async fn get_from_peer(&self, peer: &dyn PeerGetter, key: &str) -> Result<ByteView> {
        let bytes = peer.fetch(&self.name, key).await?;
        let value = ByteView::from_bytes(bytes);
        if let Some(hot) = &self.hot_cache {
            hot.add(key, value.clone());
        }
        Ok(value)
    }

    async fn get_locally(&self, key: &str) -> Result<ByteView> {
        let bytes = match self.loader.load(key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.stats.record_local_load_err();
                return Err(Error::from_loader(key, e));
            }
        };
        self.stats.record_local_load();

        let value = ByteView::from(bytes);
        self.main_cache.add(key, value.clone());
        Ok(value)
    }

    fn lookup_cache(&self, key: &str) -> Option<ByteView> {
        self.main_cache
            .get(key)
            .or_else(|| self.hot_cache.as_ref().and_then(|hot| hot.get(key)))
    }

    fn recheck_cache(&self, key: &str) -> Option<ByteView> {
        self.main_cache.get_uncounted(key).or_else(|| {
            self.hot_cache
                .as_ref()
                .and_then(|hot| hot.get_uncounted(key))
        })
    }

    /// Group counters
    pub fn stats(&self) -> &GroupStats {
        &self.stats
    }

    /// Main cache statistics
    pub fn main_cache_stats(&self) -> CacheStats {
        self.main_cache.stats()
    }

    /// Hot cache statistics, if the hot cache is enabled
    pub fn hot_cache_stats(&self) -> Option<CacheStats> {
        self.hot_cache.as_ref().map(BoundedCache::stats)
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("main_cache", &self.main_cache)
            .field("hot_cache", &self.hot_cache)
            .field("peers", &self.peers.get().is_some())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn db() -> HashMap<&'static str, &'static str> {
        HashMap::from([("Tom", "630"), ("Jack", "589"), ("Sam", "567")])
    }

    /// Loader over the test db that counts invocations per key
    fn counting_loader(counts: Arc<parking_lot::Mutex<HashMap<String, usize>>>) -> Loader {
        let db = db();
        Loader::from_fn(move |key| {
            *counts.lock().entry(key.to_string()).or_default() += 1;
            match db.get(key) {
                Some(v) => Ok(v.as_bytes().to_vec()),
                None => Err(Error::NotFound {
                    key: key.to_string(),
                }
                .into()),
            }
        })
    }

    /// Peer that always fails, like an unreachable node
    struct DownPeer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PeerGetter for DownPeer {
        fn peer_id(&self) -> &str {
            "http://down:8001"
        }

        async fn fetch(&self, _group: &str, _key: &str) -> Result<Bytes> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::PeerFetch {
                peer: self.peer_id().to_string(),
                status: 503,
                kind: None,
                reason: "unavailable".to_string(),
            })
        }
    }

    /// Peer that answers every key with a fixed value
    struct FixedPeer(&'static str);

    #[async_trait]
    impl PeerGetter for FixedPeer {
        fn peer_id(&self) -> &str {
            "http://owner:8001"
        }

        async fn fetch(&self, _group: &str, _key: &str) -> Result<Bytes> {
            Ok(Bytes::from_static(self.0.as_bytes()))
        }
    }

    /// Routes every key to one peer
    struct AlwaysPick(Arc<dyn PeerGetter>);

    impl PeerPicker for AlwaysPick {
        fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerGetter>> {
            Some(Arc::clone(&self.0))
        }
    }

    #[tokio::test]
    async fn test_get_loads_once_then_hits() {
        let counts = Arc::new(parking_lot::Mutex::new(HashMap::new()));
        let group = Group::new("scores", 2 << 10, counting_loader(Arc::clone(&counts)));

        for (k, v) in db() {
            assert_eq!(group.get(k).await.unwrap().to_string(), v);
            assert_eq!(group.get(k).await.unwrap().to_string(), v);
            assert_eq!(counts.lock()[k], 1, "cache {} miss", k);
        }

        let stats = group.stats().snapshot();
        assert_eq!(stats.gets, 6);
        assert_eq!(stats.cache_hits, 3);
        assert_eq!(stats.local_loads, 3);

        // One counted lookup per get; the re-check after a miss is not counted.
        let cache = group.main_cache_stats();
        assert_eq!(cache.gets, 6);
        assert_eq!(cache.hits, 3);
    }

    #[tokio::test]
    async fn test_empty_key_rejected_without_loading() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = {
            let calls = Arc::clone(&calls);
            Loader::from_fn(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(b"value".to_vec())
            })
        };
        let group = Group::new("scores", 0, loader);

        assert_matches!(group.get("").await, Err(Error::EmptyKey));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(group.stats().snapshot().loads, 0);
    }

    #[tokio::test]
    async fn test_unknown_key_error_is_not_cached() {
        let counts = Arc::new(parking_lot::Mutex::new(HashMap::new()));
        let group = Group::new("scores", 2 << 10, counting_loader(Arc::clone(&counts)));

        let err = group.get("unknown").await.unwrap_err();
        assert_matches!(&err, Error::NotFound { key } if key == "unknown");
        assert_eq!(err.to_string(), "unknown not exist");
        assert_eq!(group.main_cache_stats().items, 0);

        // Not cached: the loader runs again.
        assert!(group.get("unknown").await.is_err());
        assert_eq!(counts.lock()["unknown"], 2);
        assert_eq!(group.stats().snapshot().local_load_errs, 2);
    }

    #[tokio::test]
    async fn test_foreign_loader_error_is_wrapped() {
        let group = Group::new(
            "scores",
            0,
            Loader::from_fn(|_| Err::<Vec<u8>, BoxError>("connection refused".into())),
        );
        let err = group.get("Tom").await.unwrap_err();
        assert_matches!(err, Error::Load { ref key, .. } if key == "Tom");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_gets_collapse_to_one_load() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = {
            let calls = Arc::clone(&calls);
            Loader::new(move |key: String| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, BoxError>(format!("value-of-{}", key).into_bytes())
                }
            })
        };
        let group = Arc::new(Group::new("scores", 2 << 10, loader));

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let group = Arc::clone(&group);
                tokio::spawn(async move { group.get("Tom").await })
            })
            .collect();

        for handle in handles {
            let value = handle.await.unwrap().unwrap();
            assert_eq!(value.to_string(), "value-of-Tom");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(group.stats().snapshot().loads_deduped, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failures_see_same_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = {
            let calls = Arc::clone(&calls);
            Loader::new(move |key: String| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Err::<Vec<u8>, BoxError>(Error::NotFound { key }.into())
                }
            })
        };
        let group = Arc::new(Group::new("scores", 0, loader));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let group = Arc::clone(&group);
                tokio::spawn(async move { group.get("Kate").await })
            })
            .collect();

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert_eq!(err.to_string(), "Kate not exist");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_peer_failure_falls_back_to_local_load() {
        let counts = Arc::new(parking_lot::Mutex::new(HashMap::new()));
        let group = Group::new("scores", 2 << 10, counting_loader(Arc::clone(&counts)));
        let down = Arc::new(DownPeer {
            calls: AtomicUsize::new(0),
        });
        group.register_peers(Arc::new(AlwaysPick(down.clone())));

        assert_eq!(group.get("Tom").await.unwrap().to_string(), "630");
        assert_eq!(down.calls.load(Ordering::SeqCst), 1);
        assert_eq!(group.main_cache_stats().items, 1);

        // Served from the local cache now; the peer is not asked again.
        assert_eq!(group.get("Tom").await.unwrap().to_string(), "630");
        assert_eq!(down.calls.load(Ordering::SeqCst), 1);

        let stats = group.stats().snapshot();
        assert_eq!(stats.peer_errors, 1);
        assert_eq!(stats.local_loads, 1);
    }

    #[tokio::test]
    async fn test_peer_value_not_stored_by_default() {
        let counts = Arc::new(parking_lot::Mutex::new(HashMap::new()));
        let group = Group::new("scores", 2 << 10, counting_loader(Arc::clone(&counts)));
        group.register_peers(Arc::new(AlwaysPick(Arc::new(FixedPeer("remote")))));

        assert_eq!(group.get("Tom").await.unwrap().to_string(), "remote");
        assert_eq!(group.get("Tom").await.unwrap().to_string(), "remote");

        assert!(counts.lock().is_empty());
        assert_eq!(group.main_cache_stats().items, 0);
        assert!(group.hot_cache_stats().is_none());
        assert_eq!(group.stats().snapshot().peer_loads, 2);
    }

    #[tokio::test]
    async fn test_hot_cache_keeps_peer_values() {
        let counts = Arc::new(parking_lot::Mutex::new(HashMap::new()));
        let group = Group::new("scores", 2 << 10, counting_loader(Arc::clone(&counts)))
            .with_hot_cache(256);
        group.register_peers(Arc::new(AlwaysPick(Arc::new(FixedPeer("remote")))));

        group.get("Tom").await.unwrap();
        group.get("Tom").await.unwrap();

        let stats = group.stats().snapshot();
        assert_eq!(stats.peer_loads, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(group.hot_cache_stats().unwrap().items, 1);
        assert_eq!(group.main_cache_stats().items, 0);
    }

    #[test]
    #[should_panic(expected = "register_peers called more than once")]
    fn test_double_register_panics() {
        let group = Group::new("scores", 0, Loader::from_fn(|_| Ok(Vec::new())));
        let picker: Arc<dyn PeerPicker> = Arc::new(AlwaysPick(Arc::new(FixedPeer("x"))));
        group.register_peers(Arc::clone(&picker));
        group.register_peers(picker);
    }
}

//! Least-Recently-Used Eviction Core
//!
//! Not synchronised; [`BoundedCache`](super::BoundedCache) wraps it in a
//! mutex.
//!
//! # Design
//!
//! - Doubly-linked access-order list stored in a slab (`Vec`) and linked by
//!   index, with a free list for reuse of vacated slots
//! - `HashMap` index from key to slot for O(1) get/add/evict
//! - Head is the most recently used entry, tail the least recently used
//! - Entry size is `key.len() + value.len()`

use std::collections::HashMap;

use super::byteview::ByteView;

struct Node {
    key: String,
    value: ByteView,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Size-bounded LRU map from string keys to [`ByteView`]s
pub struct LruCache {
    /// Capacity in bytes; `<= 0` means unbounded
    max_bytes: i64,
    /// Bytes currently accounted for
    nbytes: i64,
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
    evictions: u64,
}

impl LruCache {
    /// Create a cache holding at most `max_bytes` bytes (`<= 0` for no limit)
    pub fn new(max_bytes: i64) -> Self {
        Self {
            max_bytes,
            nbytes: 0,
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
            evictions: 0,
        }
    }

    /// Look up a key, marking it most recently used
    pub fn get(&mut self, key: &str) -> Option<ByteView> {
        let idx = *self.index.get(key)?;
        self.move_to_front(idx);
        self.node(idx).map(|n| n.value.clone())
    }

    /// Insert or update a key, then evict least recently used entries until
    /// the cache is back under capacity.
    ///
    /// The entry just added is never evicted by its own insertion, so a value
    /// larger than the whole capacity still lands (alone) in the cache.
    pub fn add(&mut self, key: &str, value: ByteView) {
        if let Some(&idx) = self.index.get(key) {
            self.move_to_front(idx);
            if let Some(node) = self.slots[idx].as_mut() {
                self.nbytes += value.len() as i64 - node.value.len() as i64;
                node.value = value;
            }
        } else {
            self.nbytes += entry_size(key, &value);
            let node = Node {
                key: key.to_string(),
                value,
                prev: None,
                next: None,
            };
            let idx = match self.free.pop() {
                Some(idx) => {
                    self.slots[idx] = Some(node);
                    idx
                }
                None => {
                    self.slots.push(Some(node));
                    self.slots.len() - 1
                }
            };
            self.index.insert(key.to_string(), idx);
            self.push_front(idx);
        }

        while self.max_bytes > 0 && self.nbytes > self.max_bytes && self.len() > 1 {
            self.remove_oldest();
        }
    }

    /// Remove a key, returning its value if present
    pub fn remove(&mut self, key: &str) -> Option<ByteView> {
        let idx = self.index.remove(key)?;
        self.detach(idx);
        let node = self.slots[idx].take()?;
        self.free.push(idx);
        self.nbytes -= entry_size(&node.key, &node.value);
        Some(node.value)
    }

    /// Evict the least recently used entry
    pub fn remove_oldest(&mut self) -> Option<(String, ByteView)> {
        let idx = self.tail?;
        let key = self.node(idx)?.key.clone();
        let value = self.remove(&key)?;
        self.evictions += 1;
        tracing::trace!(key = %key, size = value.len(), "evicted least recently used entry");
        Some((key, value))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Bytes currently accounted for
    pub fn bytes(&self) -> i64 {
        self.nbytes
    }

    /// Configured capacity
    pub fn max_bytes(&self) -> i64 {
        self.max_bytes
    }

    /// Entries evicted so far
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            match self.node(idx) {
                Some(node) => {
                    keys.push(node.key.clone());
                    cursor = node.next;
                }
                None => break,
            }
        }
        keys
    }

    fn node(&self, idx: usize) -> Option<&Node> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = match self.node(idx) {
            Some(node) => (node.prev, node.next),
            None => return,
        };
        match prev {
            Some(p) => {
                if let Some(n) = self.slots[p].as_mut() {
                    n.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(nx) => {
                if let Some(n) = self.slots[nx].as_mut() {
                    n.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        if let Some(node) = self.slots[idx].as_mut() {
            node.prev = None;
            node.next = None;
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(node) = self.slots[idx].as_mut() {
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            if let Some(n) = self.slots[h].as_mut() {
                n.prev = Some(idx);
            }
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.detach(idx);
        self.push_front(idx);
    }
}

fn entry_size(key: &str, value: &ByteView) -> i64 {
    (key.len() + value.len()) as i64
}

impl std::fmt::Debug for LruCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCache")
            .field("max_bytes", &self.max_bytes)
            .field("nbytes", &self.nbytes)
            .field("len", &self.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn view(s: &str) -> ByteView {
        ByteView::from(s)
    }

    #[test]
    fn test_get_missing_key() {
        let mut lru = LruCache::new(0);
        assert!(lru.get("Tom").is_none());
        assert!(lru.is_empty());
    }

    #[test]
    fn test_add_then_get() {
        let mut lru = LruCache::new(0);
        lru.add("key1", view("1234"));

        assert_eq!(lru.get("key1").unwrap().to_string(), "1234");
        assert!(lru.get("key2").is_none());
        assert_eq!(lru.bytes(), 8);
    }

    #[test]
    fn test_remove_oldest_on_overflow() {
        let (k1, k2, k3) = ("key1", "key2", "k3");
        let (v1, v2, v3) = ("value1", "value2", "v3");
        let cap = (k1.len() + k2.len() + v1.len() + v2.len()) as i64;

        let mut lru = LruCache::new(cap);
        lru.add(k1, view(v1));
        lru.add(k2, view(v2));
        lru.add(k3, view(v3));

        assert!(lru.get(k1).is_none());
        assert_eq!(lru.len(), 2);
        assert_eq!(lru.evictions(), 1);
    }

    #[test]
    fn test_recently_read_entry_survives() {
        // Capacity for exactly two equal-sized entries.
        let mut lru = LruCache::new(8);
        lru.add("A", view("aaa"));
        lru.add("B", view("bbb"));
        assert!(lru.get("A").is_some());
        lru.add("C", view("ccc"));

        assert!(lru.get("B").is_none());
        assert!(lru.get("A").is_some());
        assert!(lru.get("C").is_some());
    }

    #[test]
    fn test_update_does_not_double_count() {
        let mut lru = LruCache::new(0);
        lru.add("key", view("short"));
        assert_eq!(lru.bytes(), 8);

        lru.add("key", view("a longer value"));
        assert_eq!(lru.len(), 1);
        assert_eq!(lru.bytes(), 17);

        lru.add("key", view("x"));
        assert_eq!(lru.bytes(), 4);
        assert_eq!(lru.get("key").unwrap().to_string(), "x");
    }

    #[test]
    fn test_update_refreshes_recency() {
        let mut lru = LruCache::new(8);
        lru.add("A", view("aaa"));
        lru.add("B", view("bbb"));
        lru.add("A", view("AAA"));
        lru.add("C", view("ccc"));

        assert_eq!(lru.keys(), vec!["C".to_string(), "A".to_string()]);
    }

    #[test]
    fn test_oversized_entry_is_admitted() {
        let mut lru = LruCache::new(10);
        lru.add("small", view("12"));
        lru.add("huge", view(&"x".repeat(64)));

        assert_eq!(lru.len(), 1);
        assert_eq!(lru.get("huge").unwrap().len(), 64);
        assert!(lru.get("small").is_none());
        assert!(lru.bytes() > lru.max_bytes());
    }

    #[test]
    fn test_unbounded_never_evicts() {
        let mut lru = LruCache::new(-1);
        for i in 0..1000 {
            lru.add(&format!("key-{}", i), view("value"));
        }
        assert_eq!(lru.len(), 1000);
        assert_eq!(lru.evictions(), 0);
    }

    #[test]
    fn test_remove_and_slot_reuse() {
        let mut lru = LruCache::new(0);
        lru.add("a", view("1"));
        lru.add("b", view("2"));
        assert_eq!(lru.remove("a").unwrap().to_string(), "1");
        assert!(lru.remove("a").is_none());
        assert_eq!(lru.bytes(), 2);

        lru.add("c", view("3"));
        assert_eq!(lru.slots.len(), 2);
        assert_eq!(lru.keys(), vec!["c".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_remove_oldest_order() {
        let mut lru = LruCache::new(0);
        lru.add("a", view("1"));
        lru.add("b", view("2"));
        lru.add("c", view("3"));
        lru.get("a");

        assert_eq!(lru.remove_oldest().unwrap().0, "b");
        assert_eq!(lru.remove_oldest().unwrap().0, "c");
        assert_eq!(lru.remove_oldest().unwrap().0, "a");
        assert!(lru.remove_oldest().is_none());
        assert_eq!(lru.bytes(), 0);
    }
}

//! Request Coalescing
//!
//! Collapses concurrent loads of the same key into one execution. The first
//! caller for a key becomes the executor and runs the load; callers that
//! arrive while it is in flight wait and receive a clone of its outcome.
//!
//! # Design
//!
//! - In-flight map: key -> `watch::Receiver<Option<T>>`, guarded by a mutex
//!   held only to register or deregister, never across the load itself
//! - Check-and-insert happens under one lock acquisition, so exactly one
//!   caller per key becomes executor
//! - The executor publishes through the matching `watch::Sender`; late
//!   subscribers still see the published value
//! - If the executor is dropped before publishing, its marker is removed and
//!   the sender closes; one waiter then takes over as executor

use std::collections::HashMap;
use std::future::Future;

use parking_lot::Mutex;
use tokio::sync::watch;

/// Per-key duplicate call suppression
pub struct RequestCoalescer<T> {
    calls: Mutex<HashMap<String, watch::Receiver<Option<T>>>>,
}

enum Role<'a, T> {
    Executor(InFlight<'a, T>),
    Waiter(watch::Receiver<Option<T>>),
}

/// Executor's registration; deregisters the key on drop.
struct InFlight<'a, T> {
    calls: &'a Mutex<HashMap<String, watch::Receiver<Option<T>>>>,
    key: String,
    tx: watch::Sender<Option<T>>,
}

impl<T> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        self.calls.lock().remove(&self.key);
    }
}

impl<T> Default for RequestCoalescer<T> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> RequestCoalescer<T> {
    /// Create an empty coalescer
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `load` for `key` unless a call for `key` is already in flight, in
    /// which case wait for that call and return a clone of its result.
    ///
    /// `load` is invoked at most once per call to `execute`, and never while
    /// another invocation for the same key is running.
    pub async fn execute<F, Fut>(&self, key: &str, load: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        loop {
            match self.register(key) {
                Role::Executor(flight) => {
                    let value = load().await;
                    // Publish before the marker is removed so nobody who
                    // already holds a receiver misses the outcome.
                    flight.tx.send_replace(Some(value.clone()));
                    drop(flight);
                    return value;
                }
                Role::Waiter(mut rx) => {
                    let outcome = rx
                        .wait_for(Option::is_some)
                        .await
                        .map(|published| published.clone());
                    match outcome {
                        Ok(Some(value)) => return value,
                        // Executor went away without publishing; retry.
                        _ => {
                            tracing::debug!(key = %key, "in-flight load abandoned, retrying");
                            continue;
                        }
                    }
                }
            }
        }
    }

    /// Number of keys with a load in flight
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    fn register(&self, key: &str) -> Role<'_, T> {
        let mut calls = self.calls.lock();
        if let Some(rx) = calls.get(key) {
            return Role::Waiter(rx.clone());
        }
        let (tx, rx) = watch::channel(None);
        calls.insert(key.to_string(), rx);
        Role::Executor(InFlight {
            calls: &self.calls,
            key: key.to_string(),
            tx,
        })
    }
}

impl<T> std::fmt::Debug for RequestCoalescer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCoalescer")
            .field("in_flight", &self.calls.lock().len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_single_call_runs_load() {
        let flight: RequestCoalescer<String> = RequestCoalescer::new();
        let value = flight.execute("key", || async { "bar".to_string() }).await;
        assert_eq!(value, "bar");
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_share_one_load() {
        let flight = Arc::new(RequestCoalescer::<usize>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let flight = Arc::clone(&flight);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    flight
                        .execute("key", || async {
                            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            n * 42
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_error_is_shared_and_not_cached() {
        let flight = Arc::new(RequestCoalescer::<Result<u32, String>>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let flight = Arc::clone(&flight);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    flight
                        .execute("bad", || async {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Err::<u32, _>("boom".to_string())
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Err("boom".to_string()));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Once resolved, the next call loads again.
        let again = flight.execute("bad", || async { Ok(7) }).await;
        assert_eq!(again, Ok(7));
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_coalesce() {
        let flight: RequestCoalescer<&'static str> = RequestCoalescer::new();
        let (a, b) = tokio::join!(
            flight.execute("a", || async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                "A"
            }),
            flight.execute("b", || async { "B" }),
        );
        assert_eq!((a, b), ("A", "B"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_executor_hands_over() {
        let flight = Arc::new(RequestCoalescer::<u32>::new());

        let leader = {
            let flight = Arc::clone(&flight);
            tokio::spawn(async move {
                flight
                    .execute("key", || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        1
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(flight.in_flight(), 1);

        let follower = {
            let flight = Arc::clone(&flight);
            tokio::spawn(async move { flight.execute("key", || async { 2 }).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        leader.abort();

        let value = tokio::time::timeout(Duration::from_secs(5), follower)
            .await
            .expect("follower should not hang")
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(flight.in_flight(), 0);
    }
}

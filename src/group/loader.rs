//! Loader - the source-of-truth callback
//!
//! A group calls its loader on a miss it owns (or when the owning peer
//! cannot be reached). The group guarantees at most one concurrent
//! invocation per key; invocations for different keys may run in parallel.

use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};

use crate::error::BoxError;

/// Outcome of one loader invocation
pub type LoadResult = std::result::Result<Vec<u8>, BoxError>;

type LoadFn = dyn Fn(String) -> BoxFuture<'static, LoadResult> + Send + Sync;

/// Cloneable handle to a user-supplied async loading function
///
/// A loader may return a boxed [`Error::NotFound`](crate::Error::NotFound)
/// to report a missing key; the group passes it through unchanged.
#[derive(Clone)]
pub struct Loader {
    f: Arc<LoadFn>,
}

impl Loader {
    /// Wrap an async loading function
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LoadResult> + Send + 'static,
    {
        Self {
            f: Arc::new(move |key| f(key).boxed()),
        }
    }

    /// Wrap a synchronous loading function
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&str) -> LoadResult + Send + Sync + 'static,
    {
        Self {
            f: Arc::new(move |key: String| future::ready(f(&key)).boxed()),
        }
    }

    /// Load the value for `key`
    pub async fn load(&self, key: &str) -> LoadResult {
        (self.f)(key.to_string()).await
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Loader")
    }
}

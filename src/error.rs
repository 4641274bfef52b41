//! Error types for Peercache

use std::sync::Arc;

use thiserror::Error;

use crate::peers::wire::ErrorKind;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by user-supplied loaders
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in Peercache
///
/// `Clone` so that one coalesced load outcome can be handed to every
/// waiting caller unchanged.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Empty key passed to a lookup
    #[error("key is required")]
    EmptyKey,

    /// Byte index outside of a view
    #[error("index {index} out of range for view of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Loader callback failed
    #[error("failed to load key {key:?}: {source}")]
    Load {
        key: String,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// Source of truth has no value for the key
    #[error("{key} not exist")]
    NotFound { key: String },

    // =========================================================================
    // Peer Protocol Errors
    // =========================================================================
    /// Request named a group that is not registered on this node
    #[error("no such group: {0}")]
    UnknownGroup(String),

    /// Malformed peer request
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Peer could not be reached or the response could not be read
    #[error("peer {peer} connection error: {source}")]
    PeerConnection {
        peer: String,
        #[source]
        source: Arc<reqwest::Error>,
    },

    /// Peer answered with a non-success status. `kind` is set when the
    /// body was a well-formed error body.
    #[error("peer {peer} returned {status}: {reason}")]
    PeerFetch {
        peer: String,
        status: u16,
        kind: Option<ErrorKind>,
        reason: String,
    },

    // =========================================================================
    // Runtime Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a loader failure, keeping crate errors a loader chose to return
    /// (such as [`Error::NotFound`]) as they are.
    pub fn from_loader(key: &str, err: BoxError) -> Self {
        match err.downcast::<Error>() {
            Ok(err) => *err,
            Err(source) => Error::Load {
                key: key.to_string(),
                source: Arc::from(source),
            },
        }
    }

    /// True for failures talking to a remote peer
    pub fn is_peer_error(&self) -> bool {
        matches!(
            self,
            Error::PeerConnection { .. } | Error::PeerFetch { .. }
        )
    }
}

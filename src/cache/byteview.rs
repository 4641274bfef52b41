//! Immutable Cached Values
//!
//! `ByteView` is the only value type that enters or leaves a cache. It is
//! backed by [`Bytes`], so clones share one allocation, but no API hands
//! out mutable access to it: callers that need to mutate get a fresh copy.

use std::fmt;
use std::ops::Range;

use bytes::Bytes;

use crate::error::{Error, Result};

/// Immutable snapshot of a cached value
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteView {
    b: Bytes,
}

impl ByteView {
    /// Create a view holding a private copy of `data`
    pub fn new(data: &[u8]) -> Self {
        Self {
            b: Bytes::copy_from_slice(data),
        }
    }

    /// Wrap an already immutable buffer without copying
    pub fn from_bytes(b: Bytes) -> Self {
        Self { b }
    }

    /// Length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.b.len()
    }

    /// True when the view holds no bytes
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.b.is_empty()
    }

    /// Byte at `index`
    pub fn byte_at(&self, index: usize) -> Result<u8> {
        self.b.get(index).copied().ok_or(Error::IndexOutOfRange {
            index,
            len: self.len(),
        })
    }

    /// Copy of the bytes in `range`
    pub fn copy_range(&self, range: Range<usize>) -> Result<Vec<u8>> {
        if range.start > range.end {
            return Err(Error::IndexOutOfRange {
                index: range.start,
                len: self.len(),
            });
        }
        match self.b.get(range.clone()) {
            Some(slice) => Ok(slice.to_vec()),
            None => Err(Error::IndexOutOfRange {
                index: range.end,
                len: self.len(),
            }),
        }
    }

    /// Fresh mutable copy of the whole value
    pub fn to_vec(&self) -> Vec<u8> {
        self.b.to_vec()
    }

    /// Read-only access to the bytes
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.b
    }

    /// Shared handle to the underlying buffer, for zero-copy responses
    pub fn bytes(&self) -> Bytes {
        self.b.clone()
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(v: Vec<u8>) -> Self {
        // An owned Vec has no other alias, so no copy is needed.
        Self { b: Bytes::from(v) }
    }
}

impl From<&str> for ByteView {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl fmt::Display for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.b))
    }
}

impl fmt::Debug for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteView").field("b", &self.b).finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

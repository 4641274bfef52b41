//! Peer Wire Format
//!
//! `GET {peer}{base_path}{group}/{key}` with group and key
//! percent-encoded. Success is `200` with the raw value bytes. Failures carry
//! a JSON [`ErrorBody`]:
//!
//! | kind            | status |
//! |-----------------|--------|
//! | `unknown_group` | 404    |
//! | `not_found`     | 404    |
//! | `bad_request`   | 400    |
//! | `load_failed`   | 500    |

use hyper::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default URL prefix for peer requests
pub const DEFAULT_BASE_PATH: &str = "/_peercache/";

/// Content type of successful responses
pub const VALUE_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type of error responses
pub const ERROR_CONTENT_TYPE: &str = "application/json";

/// Failure category reported by a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Group is not registered on the peer
    UnknownGroup,
    /// Source of truth has no value for the key
    NotFound,
    /// Request could not be parsed
    BadRequest,
    /// Loader failed on the peer
    LoadFailed,
}

impl ErrorKind {
    /// HTTP status for this kind
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::UnknownGroup | ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::LoadFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON body of a failed peer response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Failure category
    pub kind: ErrorKind,
    /// Human-readable description
    pub message: String,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        let kind = match err {
            Error::UnknownGroup(_) => ErrorKind::UnknownGroup,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::EmptyKey | Error::BadRequest(_) => ErrorKind::BadRequest,
            _ => ErrorKind::LoadFailed,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// URL for fetching `key` of `group` from the peer at `base_url`
pub fn fetch_url(base_url: &str, base_path: &str, group: &str, key: &str) -> String {
    format!(
        "{}{}{}/{}",
        base_url.trim_end_matches('/'),
        base_path,
        urlencoding::encode(group),
        urlencoding::encode(key)
    )
}

/// Split a request path into `(group, key)`
pub fn parse_path(path: &str, base_path: &str) -> Result<(String, String)> {
    let rest = path
        .strip_prefix(base_path)
        .ok_or_else(|| Error::BadRequest(format!("unexpected path: {}", path)))?;

    let (group, key) = rest
        .split_once('/')
        .ok_or_else(|| Error::BadRequest(format!("expected <group>/<key>, got: {}", rest)))?;

    let group = urlencoding::decode(group)
        .map_err(|e| Error::BadRequest(format!("invalid group encoding: {}", e)))?;
    let key = urlencoding::decode(key)
        .map_err(|e| Error::BadRequest(format!("invalid key encoding: {}", e)))?;

    if group.is_empty() {
        return Err(Error::BadRequest("group is required".to_string()));
    }

    Ok((group.into_owned(), key.into_owned()))
}

// =============================================================================
// Tests
// =============================================================================

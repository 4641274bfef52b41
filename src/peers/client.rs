//! Peer Client - HTTP half of the peer protocol
//!
//! Fetches a value from the owning peer. Transport failures, timeouts and
//! non-success statuses all come back as peer errors, which the group treats
//! as "fall back to a local load".

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::{debug, instrument};

use super::wire::{self, ErrorBody};
use super::PeerGetter;
use crate::error::{Error, Result};

/// Fetches values from one peer over HTTP
#[derive(Clone)]
pub struct HttpGetter {
    base_url: String,
    base_path: String,
    client: Client,
}

impl HttpGetter {
    /// Create a getter for the peer at `base_url`, sharing `client`
    pub fn new(base_url: impl Into<String>, base_path: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into(),
            base_path: base_path.into(),
            client,
        }
    }

    fn connection_error(&self, e: reqwest::Error) -> Error {
        Error::PeerConnection {
            peer: self.base_url.clone(),
            source: Arc::new(e),
        }
    }
}

impl std::fmt::Debug for HttpGetter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGetter")
            .field("base_url", &self.base_url)
            .field("base_path", &self.base_path)
            .finish()
    }
}

#[async_trait]
impl PeerGetter for HttpGetter {
    fn peer_id(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip(self), fields(peer = %self.base_url))]
    async fn fetch(&self, group: &str, key: &str) -> Result<Bytes> {
        let url = wire::fetch_url(&self.base_url, &self.base_path, group, key);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.connection_error(e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.connection_error(e))?;

        if status.is_success() {
            debug!(bytes = body.len(), "fetched from peer");
            return Ok(body);
        }

        let (kind, reason) = match serde_json::from_slice::<ErrorBody>(&body) {
            Ok(err) => (Some(err.kind), err.message),
            Err(_) => (None, String::from_utf8_lossy(&body).into_owned()),
        };

        Err(Error::PeerFetch {
            peer: self.base_url.clone(),
            status: status.as_u16(),
            kind,
            reason,
        })
    }
}

//! Peer Server - HTTP half of the peer protocol
//!
//! Answers `GET {base_path}{group}/{key}` by reading through the named
//! group, which checks its own cache and coalescer and falls back to its
//! loader on a miss.

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use super::wire::{self, ErrorBody, ErrorKind, ERROR_CONTENT_TYPE, VALUE_CONTENT_TYPE};
use crate::error::{Error, Result};
use crate::group::Registry;

/// Serves values of locally registered groups to other peers
pub struct PeerServer {
    registry: Arc<Registry>,
    base_path: String,
}

impl PeerServer {
    /// Create a server answering requests under `base_path`
    pub fn new(registry: Arc<Registry>, base_path: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            base_path: base_path.into(),
        })
    }

    /// Handle one peer request
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>> {
        debug!(method = %req.method(), path = %req.uri().path(), "peer request");

        if req.method() != Method::GET {
            return error_response(&ErrorBody {
                kind: ErrorKind::BadRequest,
                message: format!("method not allowed: {}", req.method()),
            });
        }

        match self.lookup(req.uri().path()).await {
            Ok(bytes) => {
                let mut response = Response::new(Full::new(bytes));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(VALUE_CONTENT_TYPE));
                response
            }
            Err(err) => {
                debug!(error = %err, "peer request failed");
                error_response(&ErrorBody::from(&err))
            }
        }
    }

    async fn lookup(&self, path: &str) -> Result<Bytes> {
        let (group_name, key) = wire::parse_path(path, &self.base_path)?;
        let group = self
            .registry
            .get_group(&group_name)
            .ok_or(Error::UnknownGroup(group_name))?;

        group.stats().record_server_request();
        let view = group.get(&key).await?;
        Ok(view.bytes())
    }

    /// Accept peer connections on `listener` until an accept error occurs
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("Peer server listening on {}", addr);
        }

        loop {
            let (stream, _) = listener
                .accept()
                .await
                .map_err(|e| Error::Internal(format!("Peer server accept error: {}", e)))?;

            let io = TokioIo::new(stream);
            let server = Arc::clone(&self);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = Arc::clone(&server);
                    async move { Ok::<_, std::convert::Infallible>(server.handle(req).await) }
                });
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Peer server connection error: {}", e);
                }
            });
        }
    }
}

impl std::fmt::Debug for PeerServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerServer")
            .field("base_path", &self.base_path)
            .finish()
    }
}

fn error_response(body: &ErrorBody) -> Response<Full<Bytes>> {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| body.message.clone().into_bytes());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = body.kind.status();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(ERROR_CONTENT_TYPE));
    response
}

/// Status code of a response produced by [`PeerServer::handle`] for `err`
pub fn status_for(err: &Error) -> StatusCode {
    ErrorBody::from(err).kind.status()
}

// =============================================================================
// Tests
// =============================================================================

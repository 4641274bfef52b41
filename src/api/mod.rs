//! Front-end API Server
//!
//! The client-facing surface of a node. Reads go through one configured
//! group, so a client can ask any node for any key and the group routes the
//! miss to the owning peer.
//!
//! # Endpoints
//!
//! ```text
//! GET /api?key=<key>   value bytes (application/octet-stream)
//! GET /stats           JSON statistics for every registered group
//! GET /metrics         Prometheus text exposition
//! GET /healthz         "ok"
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::cache::CacheStats;
use crate::error::{Error, Result};
use crate::group::{GroupStatsSnapshot, Registry};
use crate::metrics;
use crate::peers::status_for;
use crate::peers::wire::VALUE_CONTENT_TYPE;

/// Statistics for one group as served by `/stats`
#[derive(Debug, Serialize)]
pub struct GroupReport {
    pub counters: GroupStatsSnapshot,
    pub main_cache: CacheStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hot_cache: Option<CacheStats>,
}

/// Client-facing HTTP server for one group
pub struct ApiServer {
    registry: Arc<Registry>,
    group: String,
}

impl ApiServer {
    /// Serve reads for `group` out of `registry`
    pub fn new(registry: Arc<Registry>, group: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            group: group.into(),
        })
    }

    /// Handle one API request
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>> {
        debug!(method = %req.method(), uri = %req.uri(), "api request");

        if req.method() != Method::GET {
            return text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
        }

        match req.uri().path() {
            "/api" => self.get_value(req.uri().query()).await,
            "/stats" => self.stats(),
            "/metrics" => match metrics::render(&self.registry) {
                Ok(body) => {
                    let mut response = text(StatusCode::OK, body);
                    if let Ok(value) = HeaderValue::from_str(&metrics::content_type()) {
                        response.headers_mut().insert(CONTENT_TYPE, value);
                    }
                    response
                }
                Err(e) => {
                    error!(error = %e, "failed to render metrics");
                    text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                }
            },
            "/healthz" => text(StatusCode::OK, "ok"),
            _ => text(StatusCode::NOT_FOUND, "not found"),
        }
    }

    async fn get_value(&self, query: Option<&str>) -> Response<Full<Bytes>> {
        let result = async {
            let key = query_param(query.unwrap_or_default(), "key")?;
            let group = self
                .registry
                .get_group(&self.group)
                .ok_or_else(|| Error::UnknownGroup(self.group.clone()))?;
            group.get(&key).await
        }
        .await;

        match result {
            Ok(view) => {
                let mut response = Response::new(Full::new(view.bytes()));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(VALUE_CONTENT_TYPE));
                response
            }
            Err(e) => {
                debug!(error = %e, "api read failed");
                text(status_for(&e), e.to_string())
            }
        }
    }

    fn stats(&self) -> Response<Full<Bytes>> {
        let report: BTreeMap<String, GroupReport> = self
            .registry
            .groups()
            .into_iter()
            .map(|group| {
                let report = GroupReport {
                    counters: group.stats().snapshot(),
                    main_cache: group.main_cache_stats(),
                    hot_cache: group.hot_cache_stats(),
                };
                (group.name().to_string(), report)
            })
            .collect();

        match serde_json::to_vec(&report) {
            Ok(json) => {
                let mut response = Response::new(Full::new(Bytes::from(json)));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                response
            }
            Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }

    /// Accept client connections on `listener` until an accept error occurs
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("API server listening on {}", addr);
        }

        loop {
            let (stream, _) = listener
                .accept()
                .await
                .map_err(|e| Error::Internal(format!("API server accept error: {}", e)))?;

            let io = TokioIo::new(stream);
            let server = Arc::clone(&self);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = Arc::clone(&server);
                    async move { Ok::<_, std::convert::Infallible>(server.handle(req).await) }
                });
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("API server connection error: {}", e);
                }
            });
        }
    }
}

impl std::fmt::Debug for ApiServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiServer")
            .field("group", &self.group)
            .finish()
    }
}

/// Decoded value of `name` in a query string
fn query_param(query: &str, name: &str) -> Result<String> {
    for pair in query.split('&') {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        if k == name {
            let v = v.replace('+', " ");
            return urlencoding::decode(&v)
                .map(|v| v.into_owned())
                .map_err(|e| Error::BadRequest(format!("invalid {} parameter: {}", name, e)));
        }
    }
    Err(Error::BadRequest(format!("missing {} parameter", name)))
}

fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

// =============================================================================
// Tests
// =============================================================================

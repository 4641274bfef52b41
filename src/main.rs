//! Peercache node
//!
//! Runs one member of a peercache cluster: the peer server that other nodes
//! fetch owned keys from, and optionally the client-facing API server.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      peercache node                      │
//! ├──────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌────────────┐  │
//! │  │  ApiServer   │───▶│    Group     │───▶│  HttpPool  │──┼──▶ peers
//! │  │  (--api)     │    │  (--group)   │    │  (--peers) │  │
//! │  └──────────────┘    └──────▲───────┘    └────────────┘  │
//! │                             │                            │
//! │  ┌──────────────┐           │                            │
//! │  │  PeerServer  │───────────┘  ◀── peers                 │
//! │  │  (--addr)    │                                        │
//! │  └──────────────┘                                        │
//! └──────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use peercache::cache::DEFAULT_CACHE_BYTES;
use peercache::ring::DEFAULT_REPLICAS;
use peercache::{ApiServer, Error, Group, HttpPool, Loader, PeerServer, PoolConfig, Registry};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Peercache - distributed read-through cache node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// This node's peer URL, as listed in --peers
    #[arg(long, env = "PEERCACHE_ADDR", default_value = "http://localhost:8001")]
    addr: String,

    /// Comma-separated peer URLs (may include this node); defaults to --addr
    #[arg(long, env = "PEERCACHE_PEERS", value_delimiter = ',')]
    peers: Vec<String>,

    /// Name of the served group
    #[arg(long, env = "PEERCACHE_GROUP", default_value = "scores")]
    group: String,

    /// Main cache capacity in bytes (0 for unbounded)
    #[arg(long, env = "PEERCACHE_CACHE_BYTES", default_value_t = DEFAULT_CACHE_BYTES)]
    cache_bytes: i64,

    /// Hot cache capacity in bytes for peer-fetched values (0 disables it)
    #[arg(long, env = "PEERCACHE_HOT_CACHE_BYTES", default_value = "0")]
    hot_cache_bytes: i64,

    /// Virtual ring positions per peer
    #[arg(long, env = "PEERCACHE_REPLICAS", default_value_t = DEFAULT_REPLICAS)]
    replicas: usize,

    /// Peer fetch timeout in milliseconds
    #[arg(long, env = "PEERCACHE_FETCH_TIMEOUT_MS", default_value = "2000")]
    fetch_timeout_ms: u64,

    /// Also start the client-facing API server
    #[arg(long, env = "PEERCACHE_API")]
    api: bool,

    /// API server bind address
    #[arg(long, env = "PEERCACHE_API_ADDR", default_value = "0.0.0.0:9999")]
    api_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting peercache node {}", peercache::VERSION);
    info!("  Peer URL: {}", args.addr);
    info!("  Group: {}", args.group);
    info!("  Cache bytes: {}", args.cache_bytes);

    let registry = Arc::new(Registry::new());
    let mut group = Group::new(args.group.clone(), args.cache_bytes, demo_loader());
    if args.hot_cache_bytes > 0 {
        info!("  Hot cache bytes: {}", args.hot_cache_bytes);
        group = group.with_hot_cache(args.hot_cache_bytes);
    }
    let group = registry.register(group);

    let config = PoolConfig {
        replicas: args.replicas,
        fetch_timeout: Duration::from_millis(args.fetch_timeout_ms),
        ..Default::default()
    };
    let base_path = config.base_path.clone();
    let pool = HttpPool::new(args.addr.clone(), config)?;
    let peers = if args.peers.is_empty() {
        vec![args.addr.clone()]
    } else {
        args.peers.clone()
    };
    info!("  Peers: {}", peers.join(", "));
    pool.set_peers(peers);
    group.register_peers(pool);

    let peer_listener = TcpListener::bind(bind_addr(&args.addr)?)
        .await
        .with_context(|| format!("failed to bind peer server for {}", args.addr))?;
    let peer_server = PeerServer::new(Arc::clone(&registry), base_path);

    if args.api {
        let api_listener = TcpListener::bind(&args.api_addr)
            .await
            .with_context(|| format!("failed to bind API server on {}", args.api_addr))?;
        let api_server = ApiServer::new(Arc::clone(&registry), args.group.clone());
        tokio::spawn(async move {
            if let Err(e) = api_server.serve(api_listener).await {
                error!("API server error: {}", e);
            }
        });
    }

    peer_server.serve(peer_listener).await?;

    info!("Node shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Demo Source of Truth
// =============================================================================

/// Loader over a small in-memory score table
fn demo_loader() -> Loader {
    let db: HashMap<&'static str, &'static str> =
        HashMap::from([("Tom", "630"), ("Jack", "589"), ("Sam", "567")]);

    Loader::from_fn(move |key| {
        info!(key = %key, "slow db lookup");
        match db.get(key) {
            Some(value) => Ok(value.as_bytes().to_vec()),
            None => Err(Error::NotFound {
                key: key.to_string(),
            }
            .into()),
        }
    })
}

/// `host:port` to listen on for the peer URL `addr`
fn bind_addr(addr: &str) -> anyhow::Result<String> {
    let url = reqwest::Url::parse(addr).with_context(|| format!("invalid peer URL {}", addr))?;
    let Some(host) = url.host_str() else {
        bail!("peer URL {} has no host", addr);
    };
    let Some(port) = url.port_or_known_default() else {
        bail!("peer URL {} has no port", addr);
    };
    Ok(format!("{}:{}", host, port))
}

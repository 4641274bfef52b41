//! Prometheus Metrics
//!
//! Exposes group counters and cache gauges in the Prometheus text format.
//! Values are read from the live [`Registry`] at scrape time, so nothing
//! here has to be updated on the request path.
//!
//! # Exported series
//!
//! | Name                              | Type    | Labels         |
//! |-----------------------------------|---------|----------------|
//! | `peercache_group_<counter>_total` | counter | `group`        |
//! | `peercache_cache_bytes`           | gauge   | `group`,`cache`|
//! | `peercache_cache_items`           | gauge   | `group`,`cache`|
//! | `peercache_cache_gets_total`      | counter | `group`,`cache`|
//! | `peercache_cache_hits_total`      | counter | `group`,`cache`|
//! | `peercache_cache_evictions_total` | counter | `group`,`cache`|

use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, TextEncoder};

use crate::cache::CacheStats;
use crate::error::{Error, Result};
use crate::group::Registry;

/// Content type of [`render`] output
pub fn content_type() -> String {
    TextEncoder::new().format_type().to_string()
}

struct CacheMetrics {
    bytes: IntGaugeVec,
    items: IntGaugeVec,
    gets: IntCounterVec,
    hits: IntCounterVec,
    evictions: IntCounterVec,
}

impl CacheMetrics {
    fn new(registry: &prometheus::Registry) -> Result<Self> {
        let labels = &["group", "cache"];
        let metrics = Self {
            bytes: IntGaugeVec::new(
                Opts::new("peercache_cache_bytes", "Bytes held by the cache"),
                labels,
            )
            .map_err(prom_err)?,
            items: IntGaugeVec::new(
                Opts::new("peercache_cache_items", "Entries held by the cache"),
                labels,
            )
            .map_err(prom_err)?,
            gets: IntCounterVec::new(
                Opts::new("peercache_cache_gets_total", "Cache lookups"),
                labels,
            )
            .map_err(prom_err)?,
            hits: IntCounterVec::new(
                Opts::new("peercache_cache_hits_total", "Cache lookups that hit"),
                labels,
            )
            .map_err(prom_err)?,
            evictions: IntCounterVec::new(
                Opts::new("peercache_cache_evictions_total", "Entries evicted by the LRU policy"),
                labels,
            )
            .map_err(prom_err)?,
        };

        registry.register(Box::new(metrics.bytes.clone())).map_err(prom_err)?;
        registry.register(Box::new(metrics.items.clone())).map_err(prom_err)?;
        registry.register(Box::new(metrics.gets.clone())).map_err(prom_err)?;
        registry.register(Box::new(metrics.hits.clone())).map_err(prom_err)?;
        registry.register(Box::new(metrics.evictions.clone())).map_err(prom_err)?;
        Ok(metrics)
    }

    fn observe(&self, group: &str, cache: &str, stats: &CacheStats) {
        let labels = [group, cache];
        self.bytes.with_label_values(&labels).set(stats.bytes);
        self.items.with_label_values(&labels).set(stats.items as i64);
        self.gets.with_label_values(&labels).inc_by(stats.gets);
        self.hits.with_label_values(&labels).inc_by(stats.hits);
        self.evictions.with_label_values(&labels).inc_by(stats.evictions);
    }
}

/// Render the current state of every group in `groups`
pub fn render(groups: &Registry) -> Result<String> {
    let registry = prometheus::Registry::new();
    let cache_metrics = CacheMetrics::new(&registry)?;

    let mut group_counters: Vec<IntCounterVec> = Vec::new();
    for (name, _) in crate::group::GroupStatsSnapshot::default().counters() {
        let counter = IntCounterVec::new(
            Opts::new(
                format!("peercache_group_{}_total", name),
                format!("Group counter {}", name),
            ),
            &["group"],
        )
        .map_err(prom_err)?;
        registry.register(Box::new(counter.clone())).map_err(prom_err)?;
        group_counters.push(counter);
    }

    for group in groups.groups() {
        let snapshot = group.stats().snapshot();
        for (counter, (_, value)) in group_counters.iter().zip(snapshot.counters()) {
            counter.with_label_values(&[group.name()]).inc_by(value);
        }

        cache_metrics.observe(group.name(), "main", &group.main_cache_stats());
        if let Some(hot) = group.hot_cache_stats() {
            cache_metrics.observe(group.name(), "hot", &hot);
        }
    }

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .map_err(prom_err)?;
    String::from_utf8(buffer).map_err(|e| Error::Internal(format!("Metrics are not UTF-8: {}", e)))
}

fn prom_err(e: prometheus::Error) -> Error {
    Error::Internal(format!("Prometheus error: {}", e))
}

// =============================================================================
// Tests
// =============================================================================

//! Metrics hooks for cache traffic.
//!
//! Implement [`CacheMetrics`] to forward hits, misses, writes and evictions to
//! a monitoring system:
//!
//! ```ignore
//! use availability_cache::observability::CacheMetrics;
//! use std::time::Duration;
//!
//! struct PrometheusMetrics;
//!
//! impl CacheMetrics for PrometheusMetrics {
//!     fn record_hit(&self, _key: &str, _duration: Duration) {
//!         // counter!("availability_cache_hits").inc();
//!     }
//! }
//! ```
//!
//! The default methods log through the `log` crate. [`NoOpMetrics`], used when
//! nothing is configured, discards everything.

use std::time::Duration;

pub trait CacheMetrics: Send + Sync {
    /// A read served from the store.
    fn record_hit(&self, key: &str, duration: Duration) {
        debug!("Cache HIT: {} took {:?}", key, duration);
    }

    /// A read that had to compute, including the compute time.
    fn record_miss(&self, key: &str, duration: Duration) {
        debug!("Cache MISS: {} took {:?}", key, duration);
    }

    /// A successful write-back after a miss.
    fn record_set(&self, key: &str, duration: Duration) {
        debug!("Cache SET: {} took {:?}", key, duration);
    }

    /// A pattern eviction and how many keys it removed.
    fn record_eviction(&self, pattern: &str, evicted: u64) {
        debug!("Cache EVICT: {} removed {} keys", pattern, evicted);
    }

    /// A swallowed store failure.
    fn record_error(&self, target: &str, error: &str) {
        warn!("Cache ERROR for {}: {}", target, error);
    }
}

#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {}
    fn record_miss(&self, _key: &str, _duration: Duration) {}
    fn record_set(&self, _key: &str, _duration: Duration) {}
    fn record_eviction(&self, _pattern: &str, _evicted: u64) {}
    fn record_error(&self, _target: &str, _error: &str) {}
}

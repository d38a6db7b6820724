//! Cache metrics
//!
//! Counters are monotonic and lock-free. One [`CacheMetrics`] is created by
//! whatever composes the gateway and handed to the policy, so several policies
//! can share a sink or keep separate ones.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for cache traffic
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Lookups attempted
    requests: AtomicU64,
    /// Lookups answered from the cache
    hits: AtomicU64,
    /// Lookups that found an entry but could not validate it
    potential_hits: AtomicU64,
    /// Lookups not answered from the cache
    misses: AtomicU64,
    /// Writes that raised an error
    set_failures: AtomicU64,
    /// Writes handed to the store successfully
    writes: AtomicU64,
    /// Writes skipped for partial or volatile data
    skipped_uncacheable: AtomicU64,
    /// Writes skipped for exceeding the size limit
    skipped_oversized: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_potential_hit(&self) {
        self.potential_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set_failure(&self) {
        self.set_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_uncacheable(&self) {
        self.skipped_uncacheable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_oversized(&self) {
        self.skipped_oversized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn potential_hits(&self) -> u64 {
        self.potential_hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn set_failures(&self) -> u64 {
        self.set_failures.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn skipped_uncacheable(&self) -> u64 {
        self.skipped_uncacheable.load(Ordering::Relaxed)
    }

    pub fn skipped_oversized(&self) -> u64 {
        self.skipped_oversized.load(Ordering::Relaxed)
    }

    /// Calculate hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let requests = self.requests();
        if requests == 0 {
            0.0
        } else {
            self.hits() as f64 / requests as f64
        }
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            requests: self.requests(),
            hits: self.hits(),
            potential_hits: self.potential_hits(),
            misses: self.misses(),
            set_failures: self.set_failures(),
            writes: self.writes(),
            skipped_uncacheable: self.skipped_uncacheable(),
            skipped_oversized: self.skipped_oversized(),
        }
    }
}

/// Plain copy of [`CacheMetrics`] for exporters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheMetricsSnapshot {
    pub requests: u64,
    pub hits: u64,
    pub potential_hits: u64,
    pub misses: u64,
    pub set_failures: u64,
    pub writes: u64,
    pub skipped_uncacheable: u64,
    pub skipped_oversized: u64,
}

impl CacheMetricsSnapshot {
    /// Named counters in a fixed order
    pub fn counters(&self) -> [(&'static str, u64); 8] {
        [
            ("requests", self.requests),
            ("hits", self.hits),
            ("potential_hits", self.potential_hits),
            ("misses", self.misses),
            ("set_failures", self.set_failures),
            ("writes", self.writes),
            ("skipped_uncacheable", self.skipped_uncacheable),
            ("skipped_oversized", self.skipped_oversized),
        ]
    }
}

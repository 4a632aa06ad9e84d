//! Metrics hooks for cache operations.
//!
//! The contract reports hits, misses, negative-cache short circuits,
//! write/delete outcomes and latencies to a [`CacheMetrics`] sink. The
//! default sink discards everything.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Trait for custom metrics collection.
///
/// All methods default to no-ops so implementors only override what they
/// record.
pub trait CacheMetrics: Send + Sync {
    /// `count` keys were served by the backend.
    fn record_hits(&self, _count: usize, _duration: Duration) {}

    /// `count` keys were queried but not found in the backend.
    fn record_misses(&self, _count: usize, _duration: Duration) {}

    /// `count` keys were short-circuited by the negative cache.
    fn record_negative_hits(&self, _count: usize) {}

    /// A batch write of `requested` keys finished; `confirmed` were reported.
    fn record_set(&self, _requested: usize, _confirmed: usize, _duration: Duration) {}

    /// A batch delete of `requested` keys finished; `confirmed` were reported.
    fn record_delete(&self, _requested: usize, _confirmed: usize, _duration: Duration) {}

    /// An operation failed.
    fn record_error(&self, _operation: &str, _error: &str) {}
}

/// Default no-op metrics implementation.
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {}

/// Counting metrics sink.
///
/// # Example
///
/// ```
/// use cache_contract::observability::{CacheMetrics, CacheStats};
/// use std::time::Duration;
///
/// let stats = CacheStats::new();
/// stats.record_hits(3, Duration::from_millis(1));
/// stats.record_misses(1, Duration::from_millis(1));
/// assert_eq!(stats.snapshot().miss_rate(), 0.25);
/// ```
#[derive(Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    negative_hits: AtomicU64,
    sets: AtomicU64,
    sets_confirmed: AtomicU64,
    deletes: AtomicU64,
    deletes_confirmed: AtomicU64,
    errors: AtomicU64,
    latency_micros: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`] counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub negative_hits: u64,
    pub sets: u64,
    pub sets_confirmed: u64,
    pub deletes: u64,
    pub deletes_confirmed: u64,
    pub errors: u64,
    pub latency_micros: u64,
}

impl StatsSnapshot {
    /// Fraction of looked-up keys that had no value, counting negative-cache
    /// short circuits as misses. `0.0` when nothing was looked up.
    pub fn miss_rate(&self) -> f64 {
        let misses = self.misses + self.negative_hits;
        let total = self.hits + misses;
        if total == 0 {
            return 0.0;
        }
        misses as f64 / total as f64
    }
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            negative_hits: self.negative_hits.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            sets_confirmed: self.sets_confirmed.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            deletes_confirmed: self.deletes_confirmed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            latency_micros: self.latency_micros.load(Ordering::Relaxed),
        }
    }

    fn add_latency(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.latency_micros.fetch_add(micros, Ordering::Relaxed);
    }
}

impl CacheMetrics for CacheStats {
    fn record_hits(&self, count: usize, duration: Duration) {
        self.hits.fetch_add(count as u64, Ordering::Relaxed);
        self.add_latency(duration);
    }

    fn record_misses(&self, count: usize, _duration: Duration) {
        // Hits and misses of one batch share a single latency sample.
        self.misses.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn record_negative_hits(&self, count: usize) {
        self.negative_hits.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn record_set(&self, requested: usize, confirmed: usize, duration: Duration) {
        self.sets.fetch_add(requested as u64, Ordering::Relaxed);
        self.sets_confirmed.fetch_add(confirmed as u64, Ordering::Relaxed);
        self.add_latency(duration);
    }

    fn record_delete(&self, requested: usize, confirmed: usize, duration: Duration) {
        self.deletes.fetch_add(requested as u64, Ordering::Relaxed);
        self.deletes_confirmed.fetch_add(confirmed as u64, Ordering::Relaxed);
        self.add_latency(duration);
    }

    fn record_error(&self, operation: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        debug!("Recorded cache error in {}: {}", operation, error);
    }
}

impl<M: CacheMetrics + ?Sized> CacheMetrics for std::sync::Arc<M> {
    fn record_hits(&self, count: usize, duration: Duration) {
        (**self).record_hits(count, duration)
    }

    fn record_misses(&self, count: usize, duration: Duration) {
        (**self).record_misses(count, duration)
    }

    fn record_negative_hits(&self, count: usize) {
        (**self).record_negative_hits(count)
    }

    fn record_set(&self, requested: usize, confirmed: usize, duration: Duration) {
        (**self).record_set(requested, confirmed, duration)
    }

    fn record_delete(&self, requested: usize, confirmed: usize, duration: Duration) {
        (**self).record_delete(requested, confirmed, duration)
    }

    fn record_error(&self, operation: &str, error: &str) {
        (**self).record_error(operation, error)
    }
}

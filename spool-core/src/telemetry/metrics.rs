//! Pool-wide counters.
//!
//! One [`PoolMetrics`] lives in every discovery service and is shared with the
//! streams it builds, so drops inside an overflow buffer are attributed to the
//! service that created it.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters describing the activity of a discovery service
#[derive(Debug, Default)]
pub struct PoolMetrics {
    /// Factory chain walks that produced a stream
    pub resolutions: AtomicU64,
    /// Discoveries answered from the registry
    pub cache_hits: AtomicU64,
    /// Factory chain walks that no factory answered
    pub factory_misses: AtomicU64,
    /// Streams registered through `provide`
    pub provided: AtomicU64,
    /// Elements discarded by overflow buffers
    pub dropped_elements: AtomicU64,
    /// Subscriptions opened on shared streams
    pub subscriptions: AtomicU64,
}

impl PoolMetrics {
    /// Create zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_resolution(&self) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_factory_miss(&self) {
        self.factory_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_provided(&self) {
        self.provided.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drop(&self) {
        self.dropped_elements.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_subscription(&self) {
        self.subscriptions.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values
    #[must_use]
    pub fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            resolutions: self.resolutions.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            factory_misses: self.factory_misses.load(Ordering::Relaxed),
            provided: self.provided.load(Ordering::Relaxed),
            dropped_elements: self.dropped_elements.load(Ordering::Relaxed),
            subscriptions: self.subscriptions.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PoolMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolMetricsSnapshot {
    /// Factory chain walks that produced a stream
    pub resolutions: u64,
    /// Discoveries answered from the registry
    pub cache_hits: u64,
    /// Factory chain walks that no factory answered
    pub factory_misses: u64,
    /// Streams registered through `provide`
    pub provided: u64,
    /// Elements discarded by overflow buffers
    pub dropped_elements: u64,
    /// Subscriptions opened on shared streams
    pub subscriptions: u64,
}

impl PoolMetricsSnapshot {
    /// Fraction of discoveries served from the registry
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.resolutions + self.factory_misses;
        if total > 0 {
            self.cache_hits as f64 / total as f64
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let metrics = PoolMetrics::new();
        metrics.record_resolution();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_drop();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.resolutions, 1);
        assert_eq!(snapshot.cache_hits, 3);
        assert_eq!(snapshot.dropped_elements, 1);
        assert!((snapshot.hit_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_hit_rate() {
        assert!((PoolMetricsSnapshot::default().hit_rate() - 1.0).abs() < f64::EPSILON);
    }
}

//! Tracing setup and in-process counters

use std::sync::atomic::{AtomicU64, Ordering};

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` wins over the configured
/// filter when set.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (tests, embedding) is harmless
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Counters for the ingest and retention pipeline
#[derive(Debug, Default)]
pub struct Metrics {
    records_submitted: AtomicU64,
    records_flushed: AtomicU64,
    flush_failures: AtomicU64,
    records_dropped: AtomicU64,
    records_evicted: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self) {
        self.records_submitted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "records_submitted", "Metric incremented");
    }

    pub fn records_flushed(&self, n: u64) {
        self.records_flushed.fetch_add(n, Ordering::Relaxed);
        tracing::debug!(counter = "records_flushed", by = n, "Metric incremented");
    }

    pub fn flush_failed(&self) {
        self.flush_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "flush_failures", "Metric incremented");
    }

    pub fn records_dropped(&self, n: u64) {
        self.records_dropped.fetch_add(n, Ordering::Relaxed);
        tracing::debug!(counter = "records_dropped", by = n, "Metric incremented");
    }

    pub fn records_evicted(&self, n: u64) {
        self.records_evicted.fetch_add(n, Ordering::Relaxed);
        tracing::debug!(counter = "records_evicted", by = n, "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_submitted: self.records_submitted.load(Ordering::Relaxed),
            records_flushed: self.records_flushed.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            records_evicted: self.records_evicted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub records_submitted: u64,
    pub records_flushed: u64,
    pub flush_failures: u64,
    pub records_dropped: u64,
    pub records_evicted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_submitted();
        metrics.record_submitted();
        metrics.records_flushed(2);
        metrics.flush_failed();
        metrics.records_dropped(3);
        metrics.records_evicted(4);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.records_submitted, 2);
        assert_eq!(snapshot.records_flushed, 2);
        assert_eq!(snapshot.flush_failures, 1);
        assert_eq!(snapshot.records_dropped, 3);
        assert_eq!(snapshot.records_evicted, 4);
    }
}

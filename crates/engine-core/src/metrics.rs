use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    units_dispatched: AtomicU64,
    units_succeeded: AtomicU64,
    units_failed: AtomicU64,
    records_written: AtomicU64,
    retry_count: AtomicU64,
}

/// Run-wide counters, shared by the scheduler and every worker.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub units_dispatched: u64,
    pub units_succeeded: u64,
    pub units_failed: u64,
    pub records_written: u64,
    pub retry_count: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn increment_dispatched(&self) {
        self.inner.units_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_succeeded(&self) {
        self.inner.units_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.inner.units_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the running total after adding `count`.
    pub fn increment_records(&self, count: u64) -> u64 {
        self.inner
            .records_written
            .fetch_add(count, Ordering::Relaxed)
            + count
    }

    pub fn increment_retries(&self, count: u64) {
        self.inner.retry_count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            units_dispatched: self.inner.units_dispatched.load(Ordering::Relaxed),
            units_succeeded: self.inner.units_succeeded.load(Ordering::Relaxed),
            units_failed: self.inner.units_failed.load(Ordering::Relaxed),
            records_written: self.inner.records_written.load(Ordering::Relaxed),
            retry_count: self.inner.retry_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// True when `total` crossed a multiple of `every` while adding `added`.
pub fn crossed_interval(total: u64, added: u64, every: u64) -> bool {
    if every == 0 || added == 0 {
        return false;
    }
    (total - added) / every != total / every
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_shared_between_clones() {
        let metrics = Metrics::new();
        let worker = metrics.clone();

        worker.increment_dispatched();
        worker.increment_succeeded();
        assert_eq!(worker.increment_records(40), 40);
        assert_eq!(metrics.increment_records(2), 42);

        let snap = metrics.snapshot();
        assert_eq!(snap.units_dispatched, 1);
        assert_eq!(snap.units_succeeded, 1);
        assert_eq!(snap.records_written, 42);
    }

    #[test]
    fn detects_log_interval_crossings() {
        assert!(crossed_interval(1000, 10, 1000));
        assert!(crossed_interval(2500, 1500, 1000));
        assert!(!crossed_interval(999, 10, 1000));
        assert!(!crossed_interval(10, 10, 0));
    }
}

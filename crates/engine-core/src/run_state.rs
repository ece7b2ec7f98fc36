use chrono::{DateTime, Utc};
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicI64, Ordering},
};

const NO_TIMESTAMP: i64 = i64::MIN;

#[derive(Debug)]
struct InnerRunState {
    critical: AtomicBool,
    latest_modified_micros: AtomicI64,
}

/// The only mutable state shared between workers of one run.
///
/// Cloning shares the same flag and watermark.
#[derive(Debug, Clone)]
pub struct SharedRunState {
    inner: Arc<InnerRunState>,
}

impl SharedRunState {
    pub fn new() -> Self {
        SharedRunState {
            inner: Arc::new(InnerRunState {
                critical: AtomicBool::new(false),
                latest_modified_micros: AtomicI64::new(NO_TIMESTAMP),
            }),
        }
    }

    pub fn set_critical(&self) {
        self.inner.critical.store(true, Ordering::SeqCst);
    }

    pub fn is_critical(&self) -> bool {
        self.inner.critical.load(Ordering::SeqCst)
    }

    /// Raises the watermark to `ts` if it is newer. Order of calls does not matter.
    pub fn observe_modified(&self, ts: DateTime<Utc>) {
        self.inner
            .latest_modified_micros
            .fetch_max(ts.timestamp_micros(), Ordering::AcqRel);
    }

    pub fn latest_modified(&self) -> Option<DateTime<Utc>> {
        match self.inner.latest_modified_micros.load(Ordering::Acquire) {
            NO_TIMESTAMP => None,
            micros => DateTime::from_timestamp_micros(micros),
        }
    }
}

impl Default for SharedRunState {
    fn default() -> Self {
        Self::new()
    }
}

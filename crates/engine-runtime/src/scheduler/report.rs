use engine_core::metrics::MetricsSnapshot;
use std::{fmt, time::Duration};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    List,
    Pagination,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::List => f.write_str("list"),
            DispatchMode::Pagination => f.write_str("pagination"),
        }
    }
}

/// Counters for one scheduler run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: DispatchMode,
    pub units_dispatched: u64,
    pub units_succeeded: u64,
    pub units_failed: u64,
    pub records_written: u64,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn new(mode: DispatchMode, snapshot: MetricsSnapshot, elapsed: Duration) -> Self {
        RunReport {
            mode,
            units_dispatched: snapshot.units_dispatched,
            units_succeeded: snapshot.units_succeeded,
            units_failed: snapshot.units_failed,
            records_written: snapshot.records_written,
            elapsed,
        }
    }

    pub fn log(&self) {
        info!(
            "Processed {} units in {} mode ({} ok, {} failed), {} records written in {:.2}s",
            self.units_dispatched,
            self.mode,
            self.units_succeeded,
            self.units_failed,
            self.records_written,
            self.elapsed.as_secs_f64()
        );

        if self.units_failed > 0 {
            warn!("{} units failed and were skipped", self.units_failed);
        }
    }
}

//! Work-stealing scheduler.
//!
//! Keeps up to `workers` units in flight. Whenever any unit completes its
//! slot is refilled with the next unit straight away, so slow units never
//! hold back a whole wave. Units come either from a fixed list (list mode)
//! or from an open-ended offset/limit sequence (pagination mode).

use crate::error::SchedulerError;
use engine_core::{
    metrics::Metrics,
    run_state::SharedRunState,
    source::{OffsetProbe, UnitContext, UnitError, UnitProcessor},
};
use lane::Lane;
use model::{
    execution::unit::{UnitOutcome, WorkUnit},
    pagination::item_set::ItemSet,
};
use report::{DispatchMode, RunReport};
use std::{sync::Arc, time::Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, error, info, warn};

mod lane;
pub mod report;

type UnitResult = (usize, WorkUnit, Result<UnitOutcome, UnitError>);

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub workers: usize,
    pub page_size: u64,
    /// Sequential path: every unit runs in the calling task, one at a time.
    pub debug: bool,
}

pub struct Scheduler {
    processor: Arc<dyn UnitProcessor>,
    probe: Option<Arc<dyn OffsetProbe>>,
    options: SchedulerOptions,
    run_state: SharedRunState,
    metrics: Metrics,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        processor: Arc<dyn UnitProcessor>,
        options: SchedulerOptions,
        run_state: SharedRunState,
        metrics: Metrics,
        cancel: CancellationToken,
    ) -> Self {
        Scheduler {
            processor,
            probe: None,
            options,
            run_state,
            metrics,
            cancel,
        }
    }

    /// Probe consulted before each page is issued in pagination mode.
    pub fn with_probe(mut self, probe: Option<Arc<dyn OffsetProbe>>) -> Self {
        self.probe = probe;
        self
    }

    pub async fn run(&self, items: ItemSet) -> Result<RunReport, SchedulerError> {
        let started = Instant::now();
        let mode = if items.is_list_mode() {
            DispatchMode::List
        } else {
            DispatchMode::Pagination
        };

        match &items.items {
            Some(list) => info!(
                "Scheduling {} of {} items from offset {}",
                items.pending_items(),
                list.len(),
                items.start_offset
            ),
            None => info!(
                "Paging from offset {} in pages of {} (total: {})",
                items.start_offset,
                self.options.page_size,
                items
                    .total_count
                    .map_or_else(|| "unknown".to_string(), |n| n.to_string())
            ),
        }

        let lane = Lane::new(items, self.options.page_size, self.probe.is_some());
        if self.options.debug {
            info!("Debug mode: processing units sequentially");
            self.run_sequential(lane).await?;
        } else {
            self.run_parallel(lane).await?;
        }

        let report = RunReport::new(mode, self.metrics.snapshot(), started.elapsed());
        report.log();
        Ok(report)
    }

    async fn run_parallel(&self, mut lane: Lane) -> Result<(), SchedulerError> {
        let workers = self.options.workers.max(1);
        let mut in_flight: JoinSet<UnitResult> = JoinSet::new();

        for slot in 0..workers {
            match self.next_unit(&mut lane).await? {
                Some(unit) => self.spawn_unit(&mut in_flight, slot, unit),
                None => break,
            }
        }

        loop {
            let joined = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    warn!("Interrupted, aborting {} in-flight units", in_flight.len());
                    in_flight.abort_all();
                    return Err(SchedulerError::Interrupted);
                }
                joined = in_flight.join_next() => joined,
            };

            let Some(joined) = joined else {
                break;
            };

            let (slot, unit, result) = match joined {
                Ok(done) => done,
                Err(join_err) => {
                    error!("Worker crashed: {}", join_err);
                    self.run_state.set_critical();
                    in_flight.detach_all();
                    return Err(SchedulerError::WorkerCrashed(join_err));
                }
            };

            let outcome = match self.settle(&unit, result) {
                Ok(outcome) => outcome,
                Err(err) => {
                    // Let in-flight units finish on their own; their results are discarded.
                    in_flight.detach_all();
                    return Err(err);
                }
            };

            if self.run_state.is_critical() {
                error!("Critical error flag set, stopping the pool");
                in_flight.detach_all();
                return Err(SchedulerError::CriticalFlag);
            }

            lane.record(outcome);

            if let Some(next) = self.next_unit(&mut lane).await? {
                self.spawn_unit(&mut in_flight, slot, next);
            }
        }

        Ok(())
    }

    async fn run_sequential(&self, mut lane: Lane) -> Result<(), SchedulerError> {
        let ctx = self.unit_context(0);

        while let Some(unit) = self.next_unit(&mut lane).await? {
            self.metrics.increment_dispatched();
            debug!(%unit, "processing");

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SchedulerError::Interrupted),
                result = self.processor.process_unit(&unit, &ctx) => result,
            };

            let outcome = self.settle(&unit, result)?;
            if self.run_state.is_critical() {
                return Err(SchedulerError::CriticalFlag);
            }
            lane.record(outcome);
        }

        Ok(())
    }

    fn spawn_unit(&self, in_flight: &mut JoinSet<UnitResult>, slot: usize, unit: WorkUnit) {
        let processor = self.processor.clone();
        let ctx = self.unit_context(slot);
        let span = debug_span!("unit", worker = slot, key = unit.key());

        self.metrics.increment_dispatched();
        debug!(worker = slot, %unit, "dispatching");

        in_flight.spawn(
            async move {
                let result = processor.process_unit(&unit, &ctx).await;
                (slot, unit, result)
            }
            .instrument(span),
        );
    }

    /// Draws the next unit, asking the probe whether a page would have data.
    async fn next_unit(&self, lane: &mut Lane) -> Result<Option<WorkUnit>, SchedulerError> {
        if self.cancel.is_cancelled() {
            return Err(SchedulerError::Interrupted);
        }

        let Some(unit) = lane.peek() else {
            return Ok(None);
        };

        if let (Some(probe), Some(page)) = (&self.probe, unit.as_page()) {
            match probe.has_row_at(page.offset).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("No row at offset {}, closing pagination", page.offset);
                    lane.close();
                    return Ok(None);
                }
                Err(err) if err.is_critical() => {
                    error!("Probe at offset {} failed: {}", page.offset, err);
                    self.run_state.set_critical();
                    return Err(SchedulerError::Critical {
                        unit: unit.to_string(),
                        source: err,
                    });
                }
                Err(err) => {
                    warn!(
                        "Probe at offset {} failed, closing pagination: {}",
                        page.offset, err
                    );
                    lane.close();
                    return Ok(None);
                }
            }
        }

        lane.advance();
        Ok(Some(unit))
    }

    /// Shared by both paths so debug and parallel runs classify identically.
    fn settle(
        &self,
        unit: &WorkUnit,
        result: Result<UnitOutcome, UnitError>,
    ) -> Result<UnitOutcome, SchedulerError> {
        match result {
            Ok(outcome) => {
                if outcome.is_success() {
                    self.metrics.increment_succeeded();
                } else {
                    self.metrics.increment_failed();
                    warn!("No data for {}", unit);
                }
                Ok(outcome)
            }
            Err(err) if err.is_critical() => {
                error!("Critical error in {}: {}", unit, err);
                self.run_state.set_critical();
                self.metrics.increment_failed();
                Err(SchedulerError::Critical {
                    unit: unit.to_string(),
                    source: err,
                })
            }
            Err(err) => {
                warn!("Failed to process {}: {}", unit, err);
                self.metrics.increment_failed();
                Ok(UnitOutcome::Failed)
            }
        }
    }

    fn unit_context(&self, worker_id: usize) -> UnitContext {
        UnitContext {
            worker_id,
            run_state: self.run_state.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

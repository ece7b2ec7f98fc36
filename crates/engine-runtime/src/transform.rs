use crate::{
    error::SyncError,
    scheduler::{Scheduler, SchedulerOptions},
    summary::SyncSummary,
};
use async_trait::async_trait;
use engine_config::settings::SyncConfig;
use engine_core::{
    classify::is_critical,
    metrics::{Metrics, crossed_interval},
    run_state::SharedRunState,
    source::{OffsetProbe, UnitContext, UnitError, UnitProcessor},
    store::{StructureStore, factory::StoreFactory},
    transform::RowTransformer,
    version::VersionTracker,
};
use model::{
    execution::unit::{UnitOutcome, WorkUnit},
    pagination::{batch::BatchDescriptor, item_set::ItemSet},
    versioning::dataset::{format_version_date, today_version},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// Runs a row transformer over contiguous id-ordered ranges of the source
/// table and writes the results into the destination table.
pub struct TransformOrchestrator {
    config: Arc<SyncConfig>,
    stores: StoreFactory,
    versions: VersionTracker,
    cancel: CancellationToken,
}

impl TransformOrchestrator {
    pub fn new(
        config: Arc<SyncConfig>,
        stores: StoreFactory,
        versions: VersionTracker,
        cancel: CancellationToken,
    ) -> Self {
        TransformOrchestrator {
            config,
            stores,
            versions,
            cancel,
        }
    }

    pub async fn run(&self, transformer: Arc<dyn RowTransformer>) -> Result<SyncSummary, SyncError> {
        let dataset = self.config.transform_dataset_name();
        let span = info_span!(
            "transform",
            run_id = %Uuid::new_v4(),
            transformer = transformer.name(),
            dataset = %dataset
        );

        async {
            info!(
                "Transforming {} into {}",
                self.config.table_name, self.config.dest_table_name
            );
            match self.execute(&dataset, transformer).await {
                Ok(summary) => {
                    summary.log();
                    Ok(summary)
                }
                Err(err) => {
                    error!("Transform failed, no version committed: {}", err);
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        dataset: &str,
        transformer: Arc<dyn RowTransformer>,
    ) -> Result<SyncSummary, SyncError> {
        let current = self.versions.get_last_synced_version(dataset).await?;

        let source = self
            .stores
            .structures(&self.config.store, &self.config.table_name)
            .await?;
        let dest = self
            .stores
            .structures(&self.config.dest_store, &self.config.dest_table_name)
            .await?;
        dest.create_table().await?;

        let processor = Arc::new(TransformProcessor {
            config: self.config.clone(),
            stores: self.stores.clone(),
            transformer,
        });
        let probe: Arc<dyn OffsetProbe> = Arc::new(StoreProbe::new(source));

        let scheduler = Scheduler::new(
            processor,
            SchedulerOptions {
                workers: self.config.workers,
                page_size: self.config.batch_size,
                debug: self.config.debug,
            },
            SharedRunState::new(),
            Metrics::new(),
            self.cancel.clone(),
        )
        .with_probe(Some(probe));

        let report = scheduler
            .run(ItemSet::paged(self.config.start_offset, None))
            .await?;

        // Taken from the destination after the run: transforms may regroup
        // records, so per-unit watermarks would not be meaningful.
        let new_version = dest
            .max_last_modified()
            .await?
            .map(format_version_date)
            .unwrap_or_else(today_version);

        let committed = self
            .versions
            .commit_if_changed(dataset, current.as_deref(), &new_version)
            .await?;

        Ok(SyncSummary {
            dataset: dataset.to_string(),
            previous_version: current,
            new_version,
            version_committed: committed,
            report,
        })
    }
}

/// 1-row existence check against the source table.
pub struct StoreProbe {
    store: Arc<dyn StructureStore>,
}

impl StoreProbe {
    pub fn new(store: Arc<dyn StructureStore>) -> Self {
        StoreProbe { store }
    }
}

#[async_trait]
impl OffsetProbe for StoreProbe {
    async fn has_row_at(&self, offset: u64) -> Result<bool, UnitError> {
        Ok(self.store.has_row_at(offset).await?)
    }
}

/// Transforms one page of the source table.
pub struct TransformProcessor {
    config: Arc<SyncConfig>,
    stores: StoreFactory,
    transformer: Arc<dyn RowTransformer>,
}

impl TransformProcessor {
    async fn transform_page(
        &self,
        batch: &BatchDescriptor,
        ctx: &UnitContext,
    ) -> Result<UnitOutcome, UnitError> {
        // Handles are per unit; nothing is shared with other workers.
        let source = self
            .stores
            .structures(&self.config.store, &self.config.table_name)
            .await?;
        let dest = self
            .stores
            .structures(&self.config.dest_store, &self.config.dest_table_name)
            .await?;

        // Undecodable rows are dropped by the store, so a short page is not
        // the end of the table; the probe decides that.
        let rows = source.fetch_range(batch.offset, batch.limit).await?;
        if rows.is_empty() {
            return if source.has_row_at(batch.offset).await? {
                warn!("No readable rows in page {}", batch);
                Ok(UnitOutcome::Failed)
            } else {
                Ok(UnitOutcome::Exhausted)
            };
        }

        let mut outputs = Vec::with_capacity(rows.len());
        let mut skipped = 0usize;
        for record in &rows {
            match self.transformer.transform_row(record, source.as_ref()).await {
                Ok(mut produced) => outputs.append(&mut produced),
                Err(err) if is_critical(&err) => return Err(err.into()),
                Err(err) => {
                    warn!("Skipping record {}: {}", record.id, err);
                    skipped += 1;
                }
            }
        }

        for ts in outputs.iter().filter_map(|r| r.last_modified) {
            ctx.run_state.observe_modified(ts);
        }

        let written = dest.batch_upsert(&outputs).await? as u64;
        let total = ctx.metrics.increment_records(written);
        if crossed_interval(total, written, self.config.log_every) {
            info!("Transformed {} records so far", total);
        }
        debug!(
            worker = ctx.worker_id,
            "Page {}: {} rows read, {} written, {} skipped",
            batch,
            rows.len(),
            written,
            skipped
        );

        Ok(UnitOutcome::Processed)
    }
}

#[async_trait]
impl UnitProcessor for TransformProcessor {
    async fn process_unit(
        &self,
        unit: &WorkUnit,
        ctx: &UnitContext,
    ) -> Result<UnitOutcome, UnitError> {
        let Some(batch) = unit.as_page() else {
            return Err(UnitError::Invalid(format!(
                "transform expects pages, got {unit}"
            )));
        };

        let result = self.transform_page(batch, ctx).await;
        if let Err(err) = &result
            && err.is_critical()
        {
            ctx.run_state.set_critical();
        }
        result
    }
}

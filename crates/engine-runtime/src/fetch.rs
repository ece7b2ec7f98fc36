use crate::{
    error::SyncError,
    scheduler::{Scheduler, SchedulerOptions},
    summary::SyncSummary,
};
use engine_config::settings::SyncConfig;
use engine_core::{
    metrics::Metrics, run_state::SharedRunState, source::FetchSource, version::VersionTracker,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

/// Drives one source through setup, enumeration, scheduling, versioning and
/// cleanup. The version is only written after the scheduler finished without
/// a critical error, and only when it changed.
pub struct FetchOrchestrator {
    config: Arc<SyncConfig>,
    versions: VersionTracker,
    cancel: CancellationToken,
}

impl FetchOrchestrator {
    pub fn new(config: Arc<SyncConfig>, versions: VersionTracker, cancel: CancellationToken) -> Self {
        FetchOrchestrator {
            config,
            versions,
            cancel,
        }
    }

    pub async fn run(&self, source: &mut dyn FetchSource) -> Result<SyncSummary, SyncError> {
        let span = info_span!(
            "fetch",
            run_id = %Uuid::new_v4(),
            source = source.name(),
            dataset = source.dataset_name()
        );

        async {
            info!("Starting fetch");
            let result = self.execute(source).await;

            // Cleanup runs whatever happened above; its failure only surfaces
            // when the run itself succeeded.
            let cleanup = source.cleanup_resources().await;
            match (result, cleanup) {
                (Ok(summary), Ok(())) => {
                    summary.log();
                    Ok(summary)
                }
                (Ok(_), Err(err)) => {
                    error!("Cleanup failed: {}", err);
                    Err(err.into())
                }
                (Err(err), cleanup) => {
                    if let Err(cleanup_err) = cleanup {
                        warn!("Cleanup after failed run also failed: {}", cleanup_err);
                    }
                    error!("Fetch failed, no version committed: {}", err);
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, source: &mut dyn FetchSource) -> Result<SyncSummary, SyncError> {
        let dataset = source.dataset_name().to_string();
        let current = self.versions.get_last_synced_version(&dataset).await?;
        info!(
            "Current version of {}: {}",
            dataset,
            current.as_deref().unwrap_or("<none>")
        );

        source.setup_resources().await?;

        let items = source.enumerate_items(current.as_deref()).await?;

        let run_state = SharedRunState::new();
        let scheduler = Scheduler::new(
            source.processor(),
            SchedulerOptions {
                workers: self.config.workers,
                page_size: self.config.batch_size,
                debug: self.config.debug,
            },
            run_state.clone(),
            Metrics::new(),
            self.cancel.clone(),
        )
        .with_probe(source.probe());

        let report = scheduler.run(items).await?;

        let new_version = source
            .compute_new_version(current.as_deref(), &run_state)
            .await?;
        let committed = self
            .versions
            .commit_if_changed(&dataset, current.as_deref(), &new_version)
            .await?;

        Ok(SyncSummary {
            dataset,
            previous_version: current,
            new_version,
            version_committed: committed,
            report,
        })
    }
}

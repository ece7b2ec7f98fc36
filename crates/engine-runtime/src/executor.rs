use crate::{
    error::SyncError, fetch::FetchOrchestrator, summary::SyncSummary,
    transform::TransformOrchestrator,
};
use connectors::adapter::{SourceKind, create_source, create_transformer};
use engine_config::settings::SyncConfig;
use engine_core::{store::factory::StoreFactory, version::VersionTracker};
use model::versioning::dataset::DatasetVersion;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Entry point for fetch, transform and status runs. Holds the store
/// factory for the life of the process, so repeated runs against the same
/// sled path reuse one open database.
pub struct Executor {
    stores: StoreFactory,
    cancel: CancellationToken,
}

impl Executor {
    pub fn new(upsert_chunk: usize, cancel: CancellationToken) -> Self {
        Executor {
            stores: StoreFactory::new(upsert_chunk),
            cancel,
        }
    }

    /// Fetches `kind` into `config.store`, recording the version there.
    pub async fn fetch(
        &self,
        kind: SourceKind,
        config: Arc<SyncConfig>,
    ) -> Result<SyncSummary, SyncError> {
        let versions = VersionTracker::new(self.stores.versions(&config.store).await?);
        let mut source = create_source(kind, config.clone(), self.stores.clone())?;

        FetchOrchestrator::new(config, versions, self.cancel.clone())
            .run(source.as_mut())
            .await
    }

    /// Transforms `config.table_name` into `config.dest_table_name`. The
    /// transform version lives next to its output in `config.dest_store`.
    pub async fn transform(
        &self,
        kind: SourceKind,
        config: Arc<SyncConfig>,
    ) -> Result<SyncSummary, SyncError> {
        let versions = VersionTracker::new(self.stores.versions(&config.dest_store).await?);
        let transformer = create_transformer(kind, &config);

        TransformOrchestrator::new(config, self.stores.clone(), versions, self.cancel.clone())
            .run(transformer)
            .await
    }

    /// Stored version rows of the fetch and transform datasets, in that order.
    pub async fn status(
        &self,
        config: &SyncConfig,
    ) -> Result<Vec<(String, Option<DatasetVersion>)>, SyncError> {
        let fetch = VersionTracker::new(self.stores.versions(&config.store).await?);
        let transform = VersionTracker::new(self.stores.versions(&config.dest_store).await?);
        let transform_dataset = config.transform_dataset_name();

        Ok(vec![
            (
                config.table_name.clone(),
                fetch.describe(&config.table_name).await?,
            ),
            (
                transform_dataset.clone(),
                transform.describe(&transform_dataset).await?,
            ),
        ])
    }

    pub fn stores(&self) -> &StoreFactory {
        &self.stores
    }
}

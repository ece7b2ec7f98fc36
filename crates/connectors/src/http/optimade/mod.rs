//! Paginated fetch from an OPTIMADE-compatible HTTP API.

use crate::{
    entry::{entry_id, entry_to_record},
    error::ConnectorError,
};
use async_trait::async_trait;
use client::{OptimadeClient, PageClient};
use engine_config::settings::SyncConfig;
use engine_core::{
    metrics::{Metrics, crossed_interval},
    run_state::SharedRunState,
    source::{FetchSource, UnitContext, UnitError, UnitProcessor},
    store::factory::StoreFactory,
};
use model::{
    execution::unit::{UnitOutcome, WorkUnit},
    pagination::{batch::BatchDescriptor, item_set::ItemSet},
    versioning::dataset::{format_version_date, today_version},
};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod client;
pub mod page;

/// Builds a fresh page client for a unit.
pub type ClientFactory =
    dyn Fn(&Metrics) -> Result<Arc<dyn PageClient>, UnitError> + Send + Sync;

pub struct OptimadeSource {
    config: Arc<SyncConfig>,
    stores: StoreFactory,
    clients: Arc<ClientFactory>,
}

impl OptimadeSource {
    /// Source backed by the HTTP client at `MATSYNC_API_BASE_URL`.
    pub fn new(config: Arc<SyncConfig>, stores: StoreFactory) -> Result<Self, UnitError> {
        let base_url = config
            .require_api_base_url()
            .map_err(ConnectorError::from)?
            .to_string();
        let retry = config.retry_policy();

        let clients: Arc<ClientFactory> = Arc::new(
            move |metrics: &Metrics| -> Result<Arc<dyn PageClient>, UnitError> {
                let client = OptimadeClient::new(&base_url, retry.clone(), metrics.clone())?;
                Ok(Arc::new(client))
            },
        );

        Ok(Self::with_clients(config, stores, clients))
    }

    pub fn with_clients(
        config: Arc<SyncConfig>,
        stores: StoreFactory,
        clients: Arc<ClientFactory>,
    ) -> Self {
        OptimadeSource {
            config,
            stores,
            clients,
        }
    }
}

#[async_trait]
impl FetchSource for OptimadeSource {
    fn name(&self) -> &str {
        "optimade"
    }

    fn dataset_name(&self) -> &str {
        &self.config.table_name
    }

    async fn setup_resources(&mut self) -> Result<(), UnitError> {
        let store = self
            .stores
            .structures(&self.config.store, &self.config.table_name)
            .await?;
        store.create_table().await?;
        info!("Writing OPTIMADE entries into {}", store.table());
        Ok(())
    }

    async fn enumerate_items(
        &mut self,
        _current_version: Option<&str>,
    ) -> Result<ItemSet, UnitError> {
        // The API is paged by offset; the end is discovered from short pages.
        Ok(ItemSet::paged(self.config.start_offset, None))
    }

    fn processor(&self) -> Arc<dyn UnitProcessor> {
        Arc::new(OptimadeProcessor {
            config: self.config.clone(),
            stores: self.stores.clone(),
            clients: self.clients.clone(),
        })
    }

    async fn compute_new_version(
        &self,
        current_version: Option<&str>,
        run_state: &SharedRunState,
    ) -> Result<String, UnitError> {
        let version = match run_state.latest_modified() {
            Some(ts) => format_version_date(ts),
            None => current_version.map(str::to_string).unwrap_or_else(today_version),
        };
        Ok(version)
    }

    async fn cleanup_resources(&mut self) -> Result<(), UnitError> {
        debug!("optimade source has nothing to release");
        Ok(())
    }
}

/// Fetches one page and upserts it.
pub struct OptimadeProcessor {
    config: Arc<SyncConfig>,
    stores: StoreFactory,
    clients: Arc<ClientFactory>,
}

impl OptimadeProcessor {
    async fn fetch_page(
        &self,
        batch: &BatchDescriptor,
        ctx: &UnitContext,
    ) -> Result<UnitOutcome, UnitError> {
        let client = (self.clients)(&ctx.metrics)?;
        let page = client.fetch_page(batch).await?;

        if page.data.is_empty() {
            debug!("Page {} is empty", batch);
            return Ok(UnitOutcome::Exhausted);
        }

        let mut records = Vec::with_capacity(page.data.len());
        for entry in &page.data {
            match entry_to_record(entry) {
                Ok(record) => {
                    if let Some(ts) = record.last_modified {
                        ctx.run_state.observe_modified(ts);
                    }
                    records.push(record);
                }
                Err(err) => warn!("Skipping entry {}: {}", entry_id(entry), err),
            }
        }

        let store = self
            .stores
            .structures(&self.config.store, &self.config.table_name)
            .await?;
        let written = store.batch_upsert(&records).await? as u64;

        let total = ctx.metrics.increment_records(written);
        if crossed_interval(total, written, self.config.log_every) {
            info!("Fetched {} entries so far", total);
        }
        debug!(
            worker = ctx.worker_id,
            "Page {}: {} entries, {} written",
            batch,
            page.data.len(),
            written
        );

        if batch.is_short(page.data.len()) || page.is_last() {
            Ok(UnitOutcome::Exhausted)
        } else {
            Ok(UnitOutcome::Processed)
        }
    }
}

#[async_trait]
impl UnitProcessor for OptimadeProcessor {
    async fn process_unit(
        &self,
        unit: &WorkUnit,
        ctx: &UnitContext,
    ) -> Result<UnitOutcome, UnitError> {
        let Some(batch) = unit.as_page() else {
            return Err(UnitError::Invalid(format!(
                "optimade fetch expects pages, got {unit}"
            )));
        };

        match self.fetch_page(batch, ctx).await {
            Ok(outcome) => Ok(outcome),
            Err(err) if err.is_critical() => {
                ctx.run_state.set_critical();
                Err(err)
            }
            Err(err) => {
                warn!("Page {} failed: {}", batch, err);
                Ok(UnitOutcome::Failed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{page::PageResponse, *};
    use chrono::{TimeZone, Utc};
    use engine_core::store::StoreLocation;
    use serde_json::json;
    use std::{collections::HashMap, io};
    use tempfile::TempDir;

    /// Canned pages keyed by offset; unknown offsets return an empty page.
    struct StubClient {
        pages: HashMap<u64, Result<serde_json::Value, &'static str>>,
    }

    #[async_trait]
    impl PageClient for StubClient {
        async fn fetch_page(&self, batch: &BatchDescriptor) -> Result<PageResponse, UnitError> {
            match self.pages.get(&batch.offset) {
                Some(Ok(body)) => Ok(serde_json::from_value(body.clone()).unwrap()),
                Some(Err("refused")) => Err(UnitError::external(
                    "fetching",
                    io::Error::new(io::ErrorKind::ConnectionRefused, "Connection refused"),
                )),
                Some(Err(msg)) => Err(UnitError::external("fetching", *msg)),
                None => Ok(PageResponse::default()),
            }
        }
    }

    fn fixture(
        pages: Vec<(u64, Result<serde_json::Value, &'static str>)>,
    ) -> (TempDir, OptimadeProcessor, Arc<SyncConfig>, StoreFactory) {
        let dir = TempDir::new().unwrap();
        let mut config = SyncConfig::new("optimade", StoreLocation::Sled(dir.path().join("db")));
        config.batch_size = 2;
        let config = Arc::new(config);
        let stores = StoreFactory::new(100);

        let client: Arc<dyn PageClient> = Arc::new(StubClient {
            pages: pages.into_iter().collect(),
        });
        let clients: Arc<ClientFactory> = Arc::new(
            move |_: &Metrics| -> Result<Arc<dyn PageClient>, UnitError> { Ok(client.clone()) },
        );

        let processor = OptimadeProcessor {
            config: config.clone(),
            stores: stores.clone(),
            clients,
        };
        (dir, processor, config, stores)
    }

    fn ctx() -> UnitContext {
        UnitContext {
            worker_id: 0,
            run_state: SharedRunState::new(),
            metrics: Metrics::new(),
        }
    }

    fn page(ids: &[&str], modified: &str) -> serde_json::Value {
        let data: Vec<_> = ids
            .iter()
            .map(|id| json!({"id": id, "type": "structures", "attributes": {"last_modified": modified}}))
            .collect();
        json!({ "data": data, "meta": {} })
    }

    #[tokio::test]
    async fn full_page_is_processed_and_stored() {
        let (_dir, processor, config, stores) =
            fixture(vec![(0, Ok(page(&["a", "b"], "2024-04-02T08:00:00Z")))]);
        let ctx = ctx();

        let outcome = processor
            .process_unit(&WorkUnit::Page(BatchDescriptor::new(0, 2)), &ctx)
            .await
            .unwrap();

        assert_eq!(outcome, UnitOutcome::Processed);
        let store = stores.structures(&config.store, &config.table_name).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(
            ctx.run_state.latest_modified(),
            Some(Utc.with_ymd_and_hms(2024, 4, 2, 8, 0, 0).unwrap())
        );
        assert_eq!(ctx.metrics.snapshot().records_written, 2);
    }

    #[tokio::test]
    async fn short_or_final_pages_exhaust() {
        let last = json!({"data": [{"id": "c"}, {"id": "d"}], "meta": {"more_data_available": false}});
        let (_dir, processor, _, _) = fixture(vec![
            (0, Ok(page(&["a"], "2024-04-02T08:00:00Z"))),
            (2, Ok(last)),
        ]);
        let ctx = ctx();

        for offset in [0, 2, 4] {
            let outcome = processor
                .process_unit(&WorkUnit::Page(BatchDescriptor::new(offset, 2)), &ctx)
                .await
                .unwrap();
            assert_eq!(outcome, UnitOutcome::Exhausted, "offset {offset}");
        }
    }

    #[tokio::test]
    async fn malformed_entries_are_skipped() {
        let body = json!({"data": [{"id": "a"}, {"type": "structures"}], "meta": {}});
        let (_dir, processor, config, stores) = fixture(vec![(0, Ok(body))]);

        let outcome = processor
            .process_unit(&WorkUnit::Page(BatchDescriptor::new(0, 2)), &ctx())
            .await
            .unwrap();

        assert_eq!(outcome, UnitOutcome::Processed);
        let store = stores.structures(&config.store, &config.table_name).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn recoverable_http_errors_fail_the_page() {
        let (_dir, processor, _, _) = fixture(vec![(0, Err("HTTP 404 Not Found"))]);
        let ctx = ctx();

        let outcome = processor
            .process_unit(&WorkUnit::Page(BatchDescriptor::new(0, 2)), &ctx)
            .await
            .unwrap();

        assert_eq!(outcome, UnitOutcome::Failed);
        assert!(!ctx.run_state.is_critical());
    }

    #[tokio::test]
    async fn refused_connection_raises_the_critical_flag() {
        let (_dir, processor, _, _) = fixture(vec![(0, Err("refused"))]);
        let ctx = ctx();

        let err = processor
            .process_unit(&WorkUnit::Page(BatchDescriptor::new(0, 2)), &ctx)
            .await
            .unwrap_err();

        assert!(err.is_critical());
        assert!(ctx.run_state.is_critical());
    }

    #[tokio::test]
    async fn version_prefers_observed_watermark() {
        let dir = TempDir::new().unwrap();
        let mut config = SyncConfig::new("optimade", StoreLocation::Sled(dir.path().join("db")));
        config.api_base_url = Some("https://example.org/v1/structures".into());
        let source = OptimadeSource::new(Arc::new(config), StoreFactory::new(10)).unwrap();

        let state = SharedRunState::new();
        assert_eq!(
            source.compute_new_version(Some("2024-01-01"), &state).await.unwrap(),
            "2024-01-01"
        );
        assert_eq!(source.compute_new_version(None, &state).await.unwrap(), today_version());

        state.observe_modified(Utc.with_ymd_and_hms(2024, 5, 6, 23, 59, 0).unwrap());
        assert_eq!(
            source.compute_new_version(Some("2024-01-01"), &state).await.unwrap(),
            "2024-05-06"
        );
    }

    #[test]
    fn requires_base_url() {
        let config = SyncConfig::new("optimade", StoreLocation::Sled("/tmp/unused".into()));
        assert!(OptimadeSource::new(Arc::new(config), StoreFactory::new(10)).is_err());
    }
}

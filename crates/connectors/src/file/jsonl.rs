//! List-mode fetch over a directory of `.jsonl` dumps, one file per unit.

use crate::{entry::entry_to_record, error::ConnectorError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine_config::settings::SyncConfig;
use engine_core::{
    metrics::crossed_interval,
    run_state::SharedRunState,
    source::{FetchSource, UnitContext, UnitError, UnitProcessor},
    store::{StructureStore, factory::StoreFactory},
};
use model::{
    execution::unit::{UnitOutcome, WorkUnit},
    pagination::item_set::ItemSet,
    records::record::Record,
    versioning::dataset::{format_version_date, parse_version_date, today_version},
};
use serde_json::Value;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs,
    io::{AsyncBufReadExt, BufReader},
};
use tracing::{debug, info, warn};

const EXTENSION: &str = "jsonl";

pub struct JsonlSource {
    config: Arc<SyncConfig>,
    stores: StoreFactory,
    data_dir: PathBuf,
    newest_file: Option<DateTime<Utc>>,
}

impl JsonlSource {
    pub fn new(config: Arc<SyncConfig>, stores: StoreFactory) -> Result<Self, UnitError> {
        let data_dir = config
            .require_data_dir()
            .map_err(ConnectorError::from)?
            .clone();

        Ok(JsonlSource {
            config,
            stores,
            data_dir,
            newest_file: None,
        })
    }
}

#[async_trait]
impl FetchSource for JsonlSource {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn dataset_name(&self) -> &str {
        &self.config.table_name
    }

    async fn setup_resources(&mut self) -> Result<(), UnitError> {
        if !fs::metadata(&self.data_dir).await?.is_dir() {
            return Err(UnitError::Invalid(format!(
                "{} is not a directory",
                self.data_dir.display()
            )));
        }

        let store = self
            .stores
            .structures(&self.config.store, &self.config.table_name)
            .await?;
        store.create_table().await?;
        Ok(())
    }

    /// Files modified on or after the current version date, sorted by name.
    async fn enumerate_items(
        &mut self,
        current_version: Option<&str>,
    ) -> Result<ItemSet, UnitError> {
        let cutoff = current_version.and_then(parse_version_date);
        let mut files = Vec::new();
        let mut skipped = 0usize;

        let mut entries = fs::read_dir(&self.data_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }

            let modified: DateTime<Utc> = entry.metadata().await?.modified()?.into();
            if cutoff.is_some_and(|date| modified.date_naive() < date) {
                skipped += 1;
                continue;
            }

            self.newest_file = self.newest_file.max(Some(modified));
            files.push(path.to_string_lossy().into_owned());
        }

        files.sort();
        info!(
            "Found {} files in {} ({} unchanged since {})",
            files.len(),
            self.data_dir.display(),
            skipped,
            current_version.unwrap_or("-")
        );

        Ok(ItemSet::list(files, self.config.start_offset))
    }

    fn processor(&self) -> Arc<dyn UnitProcessor> {
        Arc::new(JsonlFileProcessor {
            config: self.config.clone(),
            stores: self.stores.clone(),
        })
    }

    async fn compute_new_version(
        &self,
        current_version: Option<&str>,
        _run_state: &SharedRunState,
    ) -> Result<String, UnitError> {
        let version = match self.newest_file {
            Some(ts) => format_version_date(ts),
            None => current_version.map(str::to_string).unwrap_or_else(today_version),
        };
        Ok(version)
    }

    async fn cleanup_resources(&mut self) -> Result<(), UnitError> {
        self.newest_file = None;
        Ok(())
    }
}

/// Parses one file and upserts its records.
pub struct JsonlFileProcessor {
    config: Arc<SyncConfig>,
    stores: StoreFactory,
}

impl JsonlFileProcessor {
    /// Streams the file line by line, upserting every `upsert_chunk` records.
    async fn load_file(&self, path: &Path, ctx: &UnitContext) -> Result<UnitOutcome, UnitError> {
        let mut lines = BufReader::new(fs::File::open(path).await?).lines();
        let chunk_size = self.config.upsert_chunk.max(1);

        let mut store: Option<Arc<dyn StructureStore>> = None;
        let mut pending = Vec::with_capacity(chunk_size);
        let mut written = 0u64;
        let mut line_no = 0usize;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let parsed = serde_json::from_str::<Value>(&line)
                .map_err(|err| err.to_string())
                .and_then(|value| entry_to_record(&value).map_err(|err| err.to_string()));
            match parsed {
                Ok(record) => {
                    if let Some(ts) = record.last_modified {
                        ctx.run_state.observe_modified(ts);
                    }
                    pending.push(record);
                }
                Err(reason) => warn!("{}:{}: skipping line: {}", path.display(), line_no, reason),
            }

            if pending.len() >= chunk_size {
                written += self.flush(&mut store, &mut pending, ctx).await?;
            }
        }
        written += self.flush(&mut store, &mut pending, ctx).await?;

        if written == 0 {
            warn!("No usable records in {}", path.display());
            return Ok(UnitOutcome::Failed);
        }

        debug!(worker = ctx.worker_id, "{}: {} records written", path.display(), written);
        Ok(UnitOutcome::Processed)
    }

    /// Upserts the buffered records, opening the store on first use.
    async fn flush(
        &self,
        store: &mut Option<Arc<dyn StructureStore>>,
        pending: &mut Vec<Record>,
        ctx: &UnitContext,
    ) -> Result<u64, UnitError> {
        if pending.is_empty() {
            return Ok(0);
        }

        let target = match store {
            Some(target) => target.clone(),
            None => {
                let opened = self
                    .stores
                    .structures(&self.config.store, &self.config.table_name)
                    .await?;
                *store = Some(opened.clone());
                opened
            }
        };

        let written = target.batch_upsert(pending.as_slice()).await? as u64;
        pending.clear();

        let total = ctx.metrics.increment_records(written);
        if crossed_interval(total, written, self.config.log_every) {
            info!("Loaded {} records so far", total);
        }
        Ok(written)
    }
}

#[async_trait]
impl UnitProcessor for JsonlFileProcessor {
    async fn process_unit(
        &self,
        unit: &WorkUnit,
        ctx: &UnitContext,
    ) -> Result<UnitOutcome, UnitError> {
        let Some(item) = unit.as_item() else {
            return Err(UnitError::Invalid(format!("jsonl fetch expects files, got {unit}")));
        };

        match self.load_file(Path::new(item), ctx).await {
            Ok(outcome) => Ok(outcome),
            Err(err) if err.is_critical() => {
                ctx.run_state.set_critical();
                Err(err)
            }
            Err(err) => {
                warn!("Failed to load {}: {}", item, err);
                Ok(UnitOutcome::Failed)
            }
        }
    }
}

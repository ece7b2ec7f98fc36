use crate::{
    error::StoreError,
    store::{StructureStore, VERSIONS_TABLE, VersionStore, validate_table_name},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{records::record::Record, versioning::dataset::DatasetVersion};
use sled::IVec;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Remembered offsets are dropped wholesale past this many entries.
const MAX_REMEMBERED_OFFSETS: usize = 4096;

/// Maps row offsets to the key stored at that offset, so a page read can
/// resume from the nearest known key instead of walking the tree from its
/// first row. Any write to the table invalidates it.
///
/// Every handle on one table must share the same index; `StoreFactory`
/// hands out one per sled path and table.
#[derive(Clone, Default)]
pub struct OffsetIndex {
    keys: Arc<Mutex<BTreeMap<u64, IVec>>>,
}

impl OffsetIndex {
    async fn nearest(&self, offset: u64) -> Option<(u64, IVec)> {
        self.keys
            .lock()
            .await
            .range(..=offset)
            .next_back()
            .map(|(at, key)| (*at, key.clone()))
    }

    async fn remember(&self, offset: u64, key: IVec) {
        let mut keys = self.keys.lock().await;
        if keys.len() >= MAX_REMEMBERED_OFFSETS {
            keys.clear();
        }
        keys.insert(offset, key);
    }

    async fn clear(&self) {
        self.keys.lock().await.clear();
    }
}

/// Embedded structure store: one sled tree per table, rows JSON-encoded
/// and keyed by record id so iteration order is id order.
pub struct SledStructureStore {
    db: sled::Db,
    table: String,
    chunk_size: usize,
    offsets: OffsetIndex,
}

impl SledStructureStore {
    pub fn new(db: sled::Db, table: &str, chunk_size: usize) -> Result<Self, StoreError> {
        Ok(Self {
            db,
            table: validate_table_name(table)?.to_string(),
            chunk_size: chunk_size.max(1),
            offsets: OffsetIndex::default(),
        })
    }

    pub fn with_offset_index(mut self, offsets: OffsetIndex) -> Self {
        self.offsets = offsets;
        self
    }

    fn tree(&self) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(self.table.as_bytes())?)
    }

    fn decode(bytes: &[u8]) -> Result<Record, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// A row that no longer decodes is logged and left out of the result.
    fn decode_or_skip(&self, key: &[u8], bytes: &[u8]) -> Option<Record> {
        match Self::decode(bytes) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(
                    table = %self.table,
                    "Skipping row '{}': {}",
                    String::from_utf8_lossy(key),
                    err
                );
                None
            }
        }
    }

    /// Iterator positioned at `offset`, resuming from the closest remembered key.
    async fn iter_from(
        &self,
        tree: &sled::Tree,
        offset: u64,
    ) -> impl Iterator<Item = sled::Result<(IVec, IVec)>> + Send + use<> {
        let (start, iter) = match self.offsets.nearest(offset).await {
            Some((at, key)) => (at, tree.range(key..)),
            None => (0, tree.iter()),
        };
        iter.skip((offset - start) as usize)
    }
}

#[async_trait]
impl StructureStore for SledStructureStore {
    fn table(&self) -> &str {
        &self.table
    }

    async fn create_table(&self) -> Result<(), StoreError> {
        self.tree()?;
        debug!(table = %self.table, "sled tree ready");
        Ok(())
    }

    async fn batch_upsert(&self, records: &[Record]) -> Result<usize, StoreError> {
        let tree = self.tree()?;
        let mut written = 0;

        for chunk in records.chunks(self.chunk_size) {
            let mut batch = sled::Batch::default();
            for record in chunk {
                let bytes = serde_json::to_vec(record).map_err(|source| StoreError::Encode {
                    id: record.id.clone(),
                    source,
                })?;
                batch.insert(record.id.as_bytes(), bytes);
            }

            // A sled batch applies atomically: the chunk lands whole or not at all.
            tree.apply_batch(batch)?;
            self.offsets.clear().await;
            written += chunk.len();
        }

        tree.flush()?;
        Ok(written)
    }

    async fn fetch_range(&self, offset: u64, limit: u64) -> Result<Vec<Record>, StoreError> {
        let tree = self.tree()?;
        let mut records = Vec::new();
        let rows = self.iter_from(&tree, offset).await.take(limit as usize + 1);

        let mut position = offset;
        for item in rows {
            let (key, value) = item?;
            if position == offset {
                self.offsets.remember(offset, key.clone()).await;
            }
            if position == offset + limit {
                // First row of the following page.
                self.offsets.remember(position, key).await;
                break;
            }
            records.extend(self.decode_or_skip(&key, &value));
            position += 1;
        }
        Ok(records)
    }

    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<Record>, StoreError> {
        let tree = self.tree()?;
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(value) = tree.get(id.as_bytes())? {
                records.extend(self.decode_or_skip(id.as_bytes(), &value));
            }
        }
        Ok(records)
    }

    async fn has_row_at(&self, offset: u64) -> Result<bool, StoreError> {
        let tree = self.tree()?;
        let mut rows = self.iter_from(&tree, offset).await;
        match rows.next() {
            Some(item) => {
                let (key, _) = item?;
                self.offsets.remember(offset, key).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.tree()?.len() as u64)
    }

    async fn max_last_modified(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let mut latest: Option<DateTime<Utc>> = None;
        for item in self.tree()?.iter() {
            let (key, value) = item?;
            if let Some(record) = self.decode_or_skip(&key, &value) {
                latest = latest.max(record.last_modified);
            }
        }
        Ok(latest)
    }
}

/// Dataset versions kept in a dedicated tree, bincode-encoded.
pub struct SledVersionStore {
    db: sled::Db,
}

impl SledVersionStore {
    pub fn new(db: sled::Db) -> Self {
        Self { db }
    }

    fn tree(&self) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(VERSIONS_TABLE)?)
    }
}

#[async_trait]
impl VersionStore for SledVersionStore {
    async fn get(&self, dataset_name: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .load(dataset_name)
            .await?
            .map(|row| row.last_synced_version))
    }

    async fn set(&self, dataset_name: &str, version: &str) -> Result<(), StoreError> {
        let row = DatasetVersion::completed(dataset_name, version);
        let bytes = bincode::serialize(&row)?;

        let tree = self.tree()?;
        tree.insert(dataset_name.as_bytes(), bytes)?;
        tree.flush()?;
        Ok(())
    }

    async fn load(&self, dataset_name: &str) -> Result<Option<DatasetVersion>, StoreError> {
        match self.tree()?.get(dataset_name.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }
}

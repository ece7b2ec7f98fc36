use crate::{
    error::StoreError,
    store::{
        StoreLocation, StructureStore, VersionStore,
        pg_store::{PgStructureStore, PgVersionStore},
        sled_store::{OffsetIndex, SledStructureStore, SledVersionStore},
    },
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::Mutex;
use tracing::info;

/// Opens store handles for workers.
///
/// Postgres handles are opened fresh per call so no connection is shared
/// between units. sled allows a single open `Db` per path per process, so
/// those are opened once and cloned, along with one offset index per table.
#[derive(Clone)]
pub struct StoreFactory {
    sled_dbs: Arc<Mutex<HashMap<PathBuf, sled::Db>>>,
    sled_offsets: Arc<Mutex<HashMap<(PathBuf, String), OffsetIndex>>>,
    chunk_size: usize,
}

impl StoreFactory {
    pub fn new(chunk_size: usize) -> Self {
        StoreFactory {
            sled_dbs: Arc::new(Mutex::new(HashMap::new())),
            sled_offsets: Arc::new(Mutex::new(HashMap::new())),
            chunk_size,
        }
    }

    pub async fn structures(
        &self,
        location: &StoreLocation,
        table: &str,
    ) -> Result<Arc<dyn StructureStore>, StoreError> {
        match location {
            StoreLocation::Sled(path) => {
                let db = self.sled_db(path).await?;
                let offsets = self
                    .sled_offsets
                    .lock()
                    .await
                    .entry((path.clone(), table.to_string()))
                    .or_default()
                    .clone();
                Ok(Arc::new(
                    SledStructureStore::new(db, table, self.chunk_size)?.with_offset_index(offsets),
                ))
            }
            StoreLocation::Postgres(url) => Ok(Arc::new(
                PgStructureStore::connect(url, table, self.chunk_size).await?,
            )),
        }
    }

    pub async fn versions(
        &self,
        location: &StoreLocation,
    ) -> Result<Arc<dyn VersionStore>, StoreError> {
        match location {
            StoreLocation::Sled(path) => {
                let db = self.sled_db(path).await?;
                Ok(Arc::new(SledVersionStore::new(db)))
            }
            StoreLocation::Postgres(url) => Ok(Arc::new(PgVersionStore::connect(url).await?)),
        }
    }

    /// The process-wide sled handle for `path`, opening it on first use.
    pub async fn sled_db(&self, path: &Path) -> Result<sled::Db, StoreError> {
        let mut dbs = self.sled_dbs.lock().await;
        if let Some(db) = dbs.get(path) {
            return Ok(db.clone());
        }

        info!("Opening sled store at {}", path.display());
        let db = sled::open(path)?;
        dbs.insert(path.to_path_buf(), db.clone());
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::records::record::Record;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reuses_one_sled_db_per_path() {
        let dir = tempdir().unwrap();
        let location = StoreLocation::Sled(dir.path().join("store"));
        let factory = StoreFactory::new(100);

        let writer = factory.structures(&location, "structures").await.unwrap();
        // A second independent sled::open on the same path would fail with a lock error.
        let reader = factory.structures(&location, "structures").await.unwrap();

        writer
            .batch_upsert(&[Record::new("a", "structures", json!({}))])
            .await
            .unwrap();
        assert_eq!(reader.count().await.unwrap(), 1);

        let versions = factory.versions(&location).await.unwrap();
        versions.set("structures", "2024-01-01").await.unwrap();
        assert_eq!(
            versions.get("structures").await.unwrap().as_deref(),
            Some("2024-01-01")
        );
    }

    #[tokio::test]
    async fn rejects_bad_table_names() {
        let dir = tempdir().unwrap();
        let location = StoreLocation::Sled(dir.path().to_path_buf());
        let factory = StoreFactory::new(100);

        assert!(matches!(
            factory.structures(&location, "bad-name").await,
            Err(StoreError::InvalidTableName(_))
        ));
    }
}

use crate::{error::StoreError, store::VersionStore};
use model::versioning::dataset::DatasetVersion;
use std::sync::Arc;
use tracing::info;

/// Per-dataset "last synced version" bookkeeping that makes re-runs incremental.
#[derive(Clone)]
pub struct VersionTracker {
    store: Arc<dyn VersionStore>,
}

impl VersionTracker {
    pub fn new(store: Arc<dyn VersionStore>) -> Self {
        VersionTracker { store }
    }

    pub async fn get_last_synced_version(
        &self,
        dataset_name: &str,
    ) -> Result<Option<String>, StoreError> {
        self.store.get(dataset_name).await
    }

    pub async fn update_version(&self, dataset_name: &str, version: &str) -> Result<(), StoreError> {
        self.store.set(dataset_name, version).await?;
        info!("Updated version of {} to {}", dataset_name, version);
        Ok(())
    }

    /// Writes `new` only when it differs from `current`. Returns whether a write happened.
    pub async fn commit_if_changed(
        &self,
        dataset_name: &str,
        current: Option<&str>,
        new: &str,
    ) -> Result<bool, StoreError> {
        if current == Some(new) {
            info!("Version of {} unchanged at {}", dataset_name, new);
            return Ok(false);
        }

        self.update_version(dataset_name, new).await?;
        Ok(true)
    }

    pub async fn describe(&self, dataset_name: &str) -> Result<Option<DatasetVersion>, StoreError> {
        self.store.load(dataset_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        writes: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl VersionStore for RecordingStore {
        async fn get(&self, dataset_name: &str) -> Result<Option<String>, StoreError> {
            Ok(self
                .writes
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(name, _)| name == dataset_name)
                .map(|(_, v)| v.clone()))
        }

        async fn set(&self, dataset_name: &str, version: &str) -> Result<(), StoreError> {
            self.writes
                .lock()
                .unwrap()
                .push((dataset_name.to_string(), version.to_string()));
            Ok(())
        }

        async fn load(&self, dataset_name: &str) -> Result<Option<DatasetVersion>, StoreError> {
            Ok(self
                .get(dataset_name)
                .await?
                .map(|v| DatasetVersion::completed(dataset_name, v)))
        }
    }

    #[tokio::test]
    async fn skips_write_when_version_is_unchanged() {
        let store = Arc::new(RecordingStore::default());
        let tracker = VersionTracker::new(store.clone());

        let wrote = tracker
            .commit_if_changed("structures", Some("2024-01-01"), "2024-01-01")
            .await
            .unwrap();

        assert!(!wrote);
        assert!(store.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn writes_first_and_changed_versions() {
        let store = Arc::new(RecordingStore::default());
        let tracker = VersionTracker::new(store.clone());

        assert!(tracker.commit_if_changed("s", None, "v1").await.unwrap());
        assert!(tracker.commit_if_changed("s", Some("v1"), "v2").await.unwrap());

        assert_eq!(
            tracker.get_last_synced_version("s").await.unwrap().as_deref(),
            Some("v2")
        );
        assert_eq!(store.writes.lock().unwrap().len(), 2);
    }
}

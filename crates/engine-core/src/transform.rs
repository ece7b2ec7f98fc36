use crate::{error::StoreError, store::StructureStore};
use async_trait::async_trait;
use model::records::record::Record;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("record '{id}': {reason}")]
    Invalid { id: String, reason: String },

    #[error("lookup failed: {0}")]
    Lookup(#[from] StoreError),
}

impl TransformError {
    pub fn invalid(id: &str, reason: impl Into<String>) -> Self {
        TransformError::Invalid {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Maps one stored record to zero or more output records.
///
/// `source` is the store being read, available for read-only lookups.
/// An empty result drops the record.
#[async_trait]
pub trait RowTransformer: Send + Sync {
    fn name(&self) -> &str;

    async fn transform_row(
        &self,
        record: &Record,
        source: &dyn StructureStore,
    ) -> Result<Vec<Record>, TransformError>;
}

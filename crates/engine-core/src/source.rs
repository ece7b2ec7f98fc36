use crate::{
    error::StoreError, metrics::Metrics, run_state::SharedRunState, transform::TransformError,
};
use async_trait::async_trait;
use model::{
    execution::unit::{UnitOutcome, WorkUnit},
    pagination::item_set::ItemSet,
};
use std::{error::Error, sync::Arc};
use thiserror::Error;

/// Error raised by a unit or by a source lifecycle hook.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },

    #[error("{0}")]
    Invalid(String),
}

impl UnitError {
    pub fn external(
        context: impl Into<String>,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        UnitError::External {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn is_critical(&self) -> bool {
        crate::classify::is_critical(self)
    }
}

/// What a worker receives alongside its unit.
#[derive(Debug, Clone)]
pub struct UnitContext {
    pub worker_id: usize,
    pub run_state: SharedRunState,
    pub metrics: Metrics,
}

/// Per-unit work supplied by a source. Implementations open their own
/// store and source connections per call.
#[async_trait]
pub trait UnitProcessor: Send + Sync {
    /// `Ok(Failed)` for "nothing usable here", `Ok(Exhausted)` when the
    /// source has no data past this unit, `Err` for anything that went wrong.
    async fn process_unit(
        &self,
        unit: &WorkUnit,
        ctx: &UnitContext,
    ) -> Result<UnitOutcome, UnitError>;
}

/// Cheap "is there a row at this offset" check used to extend an
/// open-ended pagination range.
#[async_trait]
pub trait OffsetProbe: Send + Sync {
    async fn has_row_at(&self, offset: u64) -> Result<bool, UnitError>;
}

/// Source-specific hooks driven by the fetch orchestrator.
#[async_trait]
pub trait FetchSource: Send + Sync {
    fn name(&self) -> &str;

    /// Key under which this source's version marker is stored.
    fn dataset_name(&self) -> &str;

    async fn setup_resources(&mut self) -> Result<(), UnitError>;

    async fn enumerate_items(&mut self, current_version: Option<&str>)
    -> Result<ItemSet, UnitError>;

    fn processor(&self) -> Arc<dyn UnitProcessor>;

    /// Optional probe for sources that can check for more data without a full page.
    fn probe(&self) -> Option<Arc<dyn OffsetProbe>> {
        None
    }

    async fn compute_new_version(
        &self,
        current_version: Option<&str>,
        run_state: &SharedRunState,
    ) -> Result<String, UnitError>;

    async fn cleanup_resources(&mut self) -> Result<(), UnitError>;
}

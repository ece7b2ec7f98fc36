use engine_config::settings::error::ConfigError;
use engine_core::{error::StoreError, source::UnitError};
use thiserror::Error;

/// Ways a scheduled run can end early.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A unit raised an error classified as critical.
    #[error("Critical error in {unit}: {source}")]
    Critical {
        unit: String,
        #[source]
        source: UnitError,
    },

    /// A worker raised the shared critical flag.
    #[error("Critical error flagged by a worker, run aborted")]
    CriticalFlag,

    /// A worker task panicked or was killed; its unit's effects are unknown.
    #[error("Worker crashed: {0}")]
    WorkerCrashed(#[from] tokio::task::JoinError),

    #[error("Run interrupted")]
    Interrupted,
}

/// Top-level errors of a fetch or transform run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Run aborted: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Source error: {0}")]
    Source(#[from] UnitError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SyncError {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, SyncError::Scheduler(SchedulerError::Interrupted))
    }
}

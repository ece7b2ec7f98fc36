use engine_config::settings::error::ConfigError;
use engine_runtime::error::SyncError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Sync(#[from] SyncError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),
}

impl CliError {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, CliError::Sync(err) if err.is_interrupted())
    }
}

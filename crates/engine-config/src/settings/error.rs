use engine_core::error::StoreError;
use thiserror::Error;

/// Errors raised while building the run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read env file {path}: {source}")]
    EnvFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid env file: {0}")]
    EnvSyntax(String),

    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Missing required setting {0}")]
    Missing(String),

    #[error("Invalid store location: {0}")]
    Store(#[from] StoreError),
}

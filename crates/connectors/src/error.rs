use engine_config::settings::error::ConfigError;
use engine_core::source::UnitError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Invalid base url '{0}'")]
    InvalidUrl(String),

    #[error("Unknown source '{0}', expected one of: optimade, jsonl")]
    UnknownSource(String),
}

impl From<ConnectorError> for UnitError {
    fn from(err: ConnectorError) -> Self {
        UnitError::external("connector setup", err)
    }
}

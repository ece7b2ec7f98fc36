use thiserror::Error;

/// Errors raised by structure and version stores.
///
/// Backend failures render with a "database error" prefix so the run-level
/// classifier treats an unreachable or failing store as critical.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error (sled): {0}")]
    Sled(#[from] sled::Error),

    #[error("Database error (postgres): {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("Failed to encode record '{id}': {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode stored row: {0}")]
    Decode(String),

    #[error("Invalid store url '{0}', expected sled://<path> or postgres://...")]
    InvalidUrl(String),

    #[error("Invalid table name '{0}'")]
    InvalidTableName(String),
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Decode(err.to_string())
    }
}

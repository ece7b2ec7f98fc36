use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{records::record::Record, versioning::dataset::DatasetVersion};
use std::{fmt, path::PathBuf, str::FromStr};

pub mod factory;
pub mod pg_store;
pub mod sled_store;

/// Table holding one version row per dataset.
pub const VERSIONS_TABLE: &str = "dataset_versions";

/// Keyed record store: idempotent chunked upsert plus id-ordered reads.
#[async_trait]
pub trait StructureStore: Send + Sync {
    fn table(&self) -> &str;

    async fn create_table(&self) -> Result<(), StoreError>;

    /// Inserts or fully replaces rows by id. Each chunk is applied atomically;
    /// returns the number of rows written.
    async fn batch_upsert(&self, records: &[Record]) -> Result<usize, StoreError>;

    /// Rows `offset..offset + limit` in id order.
    async fn fetch_range(&self, offset: u64, limit: u64) -> Result<Vec<Record>, StoreError>;

    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<Record>, StoreError>;

    /// One-row existence probe at `offset`.
    async fn has_row_at(&self, offset: u64) -> Result<bool, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    async fn max_last_modified(&self) -> Result<Option<DateTime<Utc>>, StoreError>;
}

#[async_trait]
pub trait VersionStore: Send + Sync {
    async fn get(&self, dataset_name: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, dataset_name: &str, version: &str) -> Result<(), StoreError>;

    /// Full row, for status reporting.
    async fn load(&self, dataset_name: &str) -> Result<Option<DatasetVersion>, StoreError>;
}

/// Where a store lives, parsed from a `sled://` or `postgres://` url.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreLocation {
    Sled(PathBuf),
    Postgres(String),
}

impl FromStr for StoreLocation {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix("sled://") {
            if path.is_empty() {
                return Err(StoreError::InvalidUrl(s.to_string()));
            }
            return Ok(StoreLocation::Sled(PathBuf::from(path)));
        }

        if s.starts_with("postgres://") || s.starts_with("postgresql://") {
            return Ok(StoreLocation::Postgres(s.to_string()));
        }

        Err(StoreError::InvalidUrl(s.to_string()))
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreLocation::Sled(path) => write!(f, "sled://{}", path.display()),
            // Credentials stay out of logs.
            StoreLocation::Postgres(url) => match url.rsplit_once('@') {
                Some((_, host)) => write!(f, "postgres://***@{host}"),
                None => f.write_str(url),
            },
        }
    }
}

/// Table names are interpolated into SQL and used as sled tree names. The
/// version table name is reserved.
pub fn validate_table_name(name: &str) -> Result<&str, StoreError> {
    let valid = !name.is_empty()
        && !name.eq_ignore_ascii_case(VERSIONS_TABLE)
        && name.len() <= 63
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(name)
    } else {
        Err(StoreError::InvalidTableName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_store_urls() {
        assert_eq!(
            "sled:///tmp/matsync".parse::<StoreLocation>().unwrap(),
            StoreLocation::Sled(PathBuf::from("/tmp/matsync"))
        );
        assert!(matches!(
            "postgres://u:p@localhost/db".parse::<StoreLocation>().unwrap(),
            StoreLocation::Postgres(_)
        ));
        assert!("mysql://localhost".parse::<StoreLocation>().is_err());
        assert!("sled://".parse::<StoreLocation>().is_err());
    }

    #[test]
    fn display_hides_postgres_credentials() {
        let loc: StoreLocation = "postgres://user:secret@db:5432/mat".parse().unwrap();
        assert_eq!(loc.to_string(), "postgres://***@db:5432/mat");
    }

    #[test]
    fn rejects_unsafe_table_names() {
        assert!(validate_table_name("optimade_structures").is_ok());
        assert!(validate_table_name("_tmp1").is_ok());
        assert!(validate_table_name("1abc").is_err());
        assert!(validate_table_name("a; DROP TABLE x").is_err());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name(VERSIONS_TABLE).is_err());
        assert!(validate_table_name("Dataset_Versions").is_err());
    }
}

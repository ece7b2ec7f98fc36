use crate::{
    error::StoreError,
    store::{StructureStore, VERSIONS_TABLE, VersionStore, validate_table_name},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{
    records::record::Record,
    versioning::dataset::{DatasetVersion, SyncStatus},
};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error};

const CREATE_VERSIONS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS dataset_versions (
    dataset_name TEXT PRIMARY KEY,
    last_synced_version TEXT,
    last_sync_date TIMESTAMPTZ,
    sync_status TEXT
)"#;

const UPSERT_VERSION_SQL: &str = r#"
INSERT INTO dataset_versions (dataset_name, last_synced_version, last_sync_date, sync_status)
VALUES ($1, $2, NOW(), $3)
ON CONFLICT (dataset_name) DO UPDATE SET
    last_synced_version = EXCLUDED.last_synced_version,
    last_sync_date = EXCLUDED.last_sync_date,
    sync_status = EXCLUDED.sync_status"#;

/// Opens a client and drives its connection on a background task.
pub async fn connect_client(url: &str) -> Result<Client, StoreError> {
    let (client, connection) = tokio_postgres::connect(url, NoTls).await?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("Postgres connection error: {}", e);
        }
    });

    Ok(client)
}

/// Structure store backed by a Postgres table
/// `(id TEXT PRIMARY KEY, type TEXT, attributes JSONB, last_modified TIMESTAMPTZ)`.
pub struct PgStructureStore {
    // Transactions need `&mut Client`.
    client: Mutex<Client>,
    table: String,
    chunk_size: usize,
}

impl PgStructureStore {
    pub async fn connect(url: &str, table: &str, chunk_size: usize) -> Result<Self, StoreError> {
        let table = validate_table_name(table)?.to_string();
        let client = connect_client(url).await?;
        Ok(Self {
            client: Mutex::new(client),
            table,
            chunk_size: chunk_size.max(1),
        })
    }

    fn upsert_sql(&self) -> String {
        format!(
            r#"INSERT INTO {t} (id, "type", attributes, last_modified)
VALUES ($1, $2, $3, $4)
ON CONFLICT (id) DO UPDATE SET
    "type" = EXCLUDED."type",
    attributes = EXCLUDED.attributes,
    last_modified = EXCLUDED.last_modified"#,
            t = self.table
        )
    }

    fn row_to_record(row: &Row) -> Result<Record, StoreError> {
        Ok(Record {
            id: row.try_get("id")?,
            kind: row.try_get::<_, Option<String>>("type")?.unwrap_or_default(),
            attributes: row
                .try_get::<_, Option<Value>>("attributes")?
                .unwrap_or(Value::Null),
            last_modified: row.try_get("last_modified")?,
        })
    }
}

#[async_trait]
impl StructureStore for PgStructureStore {
    fn table(&self) -> &str {
        &self.table
    }

    async fn create_table(&self) -> Result<(), StoreError> {
        let ddl = format!(
            r#"CREATE TABLE IF NOT EXISTS {} (
    id TEXT PRIMARY KEY,
    "type" TEXT,
    attributes JSONB,
    last_modified TIMESTAMPTZ NULL
)"#,
            self.table
        );
        self.client.lock().await.batch_execute(&ddl).await?;
        debug!(table = %self.table, "postgres table ready");
        Ok(())
    }

    async fn batch_upsert(&self, records: &[Record]) -> Result<usize, StoreError> {
        let sql = self.upsert_sql();
        let mut client = self.client.lock().await;
        let mut written = 0;

        for chunk in records.chunks(self.chunk_size) {
            // Dropping an uncommitted transaction rolls the chunk back.
            let tx = client.transaction().await?;
            let stmt = tx.prepare(&sql).await?;
            for record in chunk {
                tx.execute(
                    &stmt,
                    &[
                        &record.id,
                        &record.kind,
                        &record.attributes,
                        &record.last_modified,
                    ],
                )
                .await?;
            }
            tx.commit().await?;
            written += chunk.len();
        }

        Ok(written)
    }

    async fn fetch_range(&self, offset: u64, limit: u64) -> Result<Vec<Record>, StoreError> {
        let sql = format!(
            r#"SELECT id, "type", attributes, last_modified FROM {} ORDER BY id LIMIT $1 OFFSET $2"#,
            self.table
        );
        let rows = self
            .client
            .lock()
            .await
            .query(&sql, &[&(limit as i64), &(offset as i64)])
            .await?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<Record>, StoreError> {
        let sql = format!(
            r#"SELECT id, "type", attributes, last_modified FROM {} WHERE id = ANY($1) ORDER BY id"#,
            self.table
        );
        let rows = self.client.lock().await.query(&sql, &[&ids]).await?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn has_row_at(&self, offset: u64) -> Result<bool, StoreError> {
        let sql = format!("SELECT id FROM {} ORDER BY id LIMIT 1 OFFSET $1", self.table);
        let row = self
            .client
            .lock()
            .await
            .query_opt(&sql, &[&(offset as i64)])
            .await?;
        Ok(row.is_some())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let row = self.client.lock().await.query_one(&sql, &[]).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    async fn max_last_modified(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let sql = format!("SELECT MAX(last_modified) FROM {}", self.table);
        let row = self.client.lock().await.query_one(&sql, &[]).await?;
        Ok(row.try_get(0)?)
    }
}

pub struct PgVersionStore {
    client: Client,
}

impl PgVersionStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = connect_client(url).await?;
        client.batch_execute(CREATE_VERSIONS_DDL).await?;
        Ok(Self { client })
    }
}

#[async_trait]
impl VersionStore for PgVersionStore {
    async fn get(&self, dataset_name: &str) -> Result<Option<String>, StoreError> {
        let sql = format!("SELECT last_synced_version FROM {VERSIONS_TABLE} WHERE dataset_name = $1");
        let row = self.client.query_opt(&sql, &[&dataset_name]).await?;
        match row {
            Some(row) => Ok(row.try_get::<_, Option<String>>(0)?),
            None => Ok(None),
        }
    }

    async fn set(&self, dataset_name: &str, version: &str) -> Result<(), StoreError> {
        self.client
            .execute(
                UPSERT_VERSION_SQL,
                &[&dataset_name, &version, &SyncStatus::Completed.as_str()],
            )
            .await?;
        Ok(())
    }

    async fn load(&self, dataset_name: &str) -> Result<Option<DatasetVersion>, StoreError> {
        let sql = format!(
            "SELECT dataset_name, last_synced_version, last_sync_date, sync_status \
             FROM {VERSIONS_TABLE} WHERE dataset_name = $1"
        );
        let Some(row) = self.client.query_opt(&sql, &[&dataset_name]).await? else {
            return Ok(None);
        };

        let status: Option<String> = row.try_get("sync_status")?;
        let sync_status = status
            .as_deref()
            .unwrap_or("completed")
            .parse::<SyncStatus>()
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        Ok(Some(DatasetVersion {
            dataset_name: row.try_get("dataset_name")?,
            last_synced_version: row
                .try_get::<_, Option<String>>("last_synced_version")?
                .unwrap_or_default(),
            last_sync_date: row
                .try_get::<_, Option<DateTime<Utc>>>("last_sync_date")?
                .unwrap_or_else(Utc::now),
            sync_status,
        }))
    }
}

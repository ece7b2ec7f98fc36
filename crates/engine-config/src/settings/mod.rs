use crate::{env::EnvManager, settings::error::ConfigError};
use engine_core::{retry::RetryPolicy, store::StoreLocation};
use std::{path::PathBuf, time::Duration};
use tracing::debug;

pub mod error;

const ENV_PREFIX: &str = "MATSYNC_";

pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_BATCH_SIZE: u64 = 500;
pub const DEFAULT_LOG_EVERY: u64 = 1000;
pub const DEFAULT_MAX_RETRIES: usize = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2000;
pub const DEFAULT_UPSERT_CHUNK: usize = 1000;
pub const DEFAULT_STORE_URL: &str = "sled://~/.matsync/store";

/// Values given on the command line. They win over the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub workers: Option<usize>,
    pub batch_size: Option<u64>,
    pub offset: Option<u64>,
    pub debug: bool,
    pub table_name: Option<String>,
    pub dest_table_name: Option<String>,
}

/// Run configuration, built once at startup and passed down read-only.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Source identifier, e.g. `optimade` or `jsonl`.
    pub source: String,
    pub workers: usize,
    /// Page size in pagination mode, range size for transforms.
    pub batch_size: u64,
    pub start_offset: u64,
    /// Run every unit sequentially in the calling task.
    pub debug: bool,
    pub log_every: u64,
    pub max_retries: usize,
    pub retry_delay: Duration,
    pub upsert_chunk: usize,
    pub store: StoreLocation,
    pub dest_store: StoreLocation,
    pub table_name: String,
    pub dest_table_name: String,
    pub api_base_url: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub required_fields: Vec<String>,
    pub keep_fields: Vec<String>,
}

impl SyncConfig {
    /// Defaults for `source` writing into `store`; dest store is the same.
    pub fn new(source: &str, store: StoreLocation) -> Self {
        SyncConfig {
            source: source.to_string(),
            workers: DEFAULT_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            start_offset: 0,
            debug: false,
            log_every: DEFAULT_LOG_EVERY,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            upsert_chunk: DEFAULT_UPSERT_CHUNK,
            dest_store: store.clone(),
            store,
            table_name: format!("{source}_structures"),
            dest_table_name: format!("{source}_materials"),
            api_base_url: None,
            data_dir: None,
            required_fields: Vec::new(),
            keep_fields: Vec::new(),
        }
    }

    pub fn from_env(
        source: &str,
        env: &EnvManager,
        overrides: &Overrides,
    ) -> Result<Self, ConfigError> {
        let key = |name: &str| format!("{ENV_PREFIX}{name}");

        let store_url = env.get(&key("STORE_URL")).unwrap_or(DEFAULT_STORE_URL);
        let store = parse_location(store_url)?;
        let dest_store = match env.get(&key("DEST_STORE_URL")) {
            Some(url) => parse_location(url)?,
            None => store.clone(),
        };

        let mut config = SyncConfig::new(source, store);
        config.dest_store = dest_store;

        if let Some(v) = env.get_parsed(&key("WORKERS"))? {
            config.workers = v;
        }
        if let Some(v) = env.get_parsed(&key("BATCH_SIZE"))? {
            config.batch_size = v;
        }
        if let Some(v) = env.get_parsed(&key("OFFSET"))? {
            config.start_offset = v;
        }
        if let Some(v) = env.get_parsed(&key("LOG_EVERY"))? {
            config.log_every = v;
        }
        if let Some(v) = env.get_parsed(&key("MAX_RETRIES"))? {
            config.max_retries = v;
        }
        if let Some(ms) = env.get_parsed::<u64>(&key("RETRY_DELAY_MS"))? {
            config.retry_delay = Duration::from_millis(ms);
        }
        if let Some(v) = env.get_parsed(&key("UPSERT_CHUNK"))? {
            config.upsert_chunk = v;
        }
        if let Some(v) = env.get(&key("TABLE_NAME")) {
            config.table_name = v.to_string();
        }
        if let Some(v) = env.get(&key("DEST_TABLE_NAME")) {
            config.dest_table_name = v.to_string();
        }
        config.api_base_url = env.get(&key("API_BASE_URL")).map(str::to_string);
        config.data_dir = env.get(&key("DATA_DIR")).map(expand_home);
        config.required_fields = env.get_list(&key("REQUIRED_FIELDS")).unwrap_or_default();
        config.keep_fields = env.get_list(&key("KEEP_FIELDS")).unwrap_or_default();

        config.apply(overrides);
        config.validate()?;

        debug!(
            source = %config.source,
            store = %config.store,
            dest_store = %config.dest_store,
            workers = config.workers,
            batch_size = config.batch_size,
            debug_mode = config.debug,
            "configuration loaded"
        );
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(workers) = overrides.workers {
            self.workers = workers;
        }
        if let Some(batch_size) = overrides.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(offset) = overrides.offset {
            self.start_offset = offset;
        }
        if let Some(table) = &overrides.table_name {
            self.table_name = table.clone();
        }
        if let Some(table) = &overrides.dest_table_name {
            self.dest_table_name = table.clone();
        }
        self.debug |= overrides.debug;
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("workers", self.workers as u64),
            ("batch_size", self.batch_size),
            ("upsert_chunk", self.upsert_chunk as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: name.to_string(),
                    value: value.to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Version key of the transform step.
    pub fn transform_dataset_name(&self) -> String {
        format!("{}_transform", self.dest_table_name)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_retries(self.max_retries, self.retry_delay)
    }

    pub fn require_api_base_url(&self) -> Result<&str, ConfigError> {
        self.api_base_url
            .as_deref()
            .ok_or_else(|| ConfigError::Missing(format!("{ENV_PREFIX}API_BASE_URL")))
    }

    pub fn require_data_dir(&self) -> Result<&PathBuf, ConfigError> {
        self.data_dir
            .as_ref()
            .ok_or_else(|| ConfigError::Missing(format!("{ENV_PREFIX}DATA_DIR")))
    }
}

fn parse_location(url: &str) -> Result<StoreLocation, ConfigError> {
    Ok(match url.parse::<StoreLocation>()? {
        StoreLocation::Sled(path) => StoreLocation::Sled(expand_home(&path.to_string_lossy())),
        other => other,
    })
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

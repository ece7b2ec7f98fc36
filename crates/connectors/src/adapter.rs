use crate::{
    error::ConnectorError, file::jsonl::JsonlSource, http::optimade::OptimadeSource,
    transform::projection::ProjectionTransformer,
};
use engine_config::settings::SyncConfig;
use engine_core::{
    source::{FetchSource, UnitError},
    store::factory::StoreFactory,
    transform::RowTransformer,
};
use std::{fmt, str::FromStr, sync::Arc};

/// Sources this build knows how to fetch from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Optimade,
    Jsonl,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Optimade => "optimade",
            SourceKind::Jsonl => "jsonl",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "optimade" => Ok(SourceKind::Optimade),
            "jsonl" => Ok(SourceKind::Jsonl),
            other => Err(ConnectorError::UnknownSource(other.to_string())),
        }
    }
}

pub fn create_source(
    kind: SourceKind,
    config: Arc<SyncConfig>,
    stores: StoreFactory,
) -> Result<Box<dyn FetchSource>, UnitError> {
    let source: Box<dyn FetchSource> = match kind {
        SourceKind::Optimade => Box::new(OptimadeSource::new(config, stores)?),
        SourceKind::Jsonl => Box::new(JsonlSource::new(config, stores)?),
    };
    Ok(source)
}

/// Both sources share the projection transform; only the source tag differs.
pub fn create_transformer(kind: SourceKind, config: &SyncConfig) -> Arc<dyn RowTransformer> {
    Arc::new(ProjectionTransformer::new(
        kind.as_str(),
        config.required_fields.clone(),
        config.keep_fields.clone(),
    ))
}

use async_trait::async_trait;
use engine_core::{
    store::StructureStore,
    transform::{RowTransformer, TransformError},
};
use model::records::record::Record;
use serde_json::{Map, Value};
use tracing::debug;

pub const OUTPUT_KIND: &str = "material";

/// Reshapes raw structures into the normalized material layout: drops
/// records missing a required attribute, keeps only the configured
/// attributes (all of them when none are configured), derives
/// `nelements` and stamps the originating source.
pub struct ProjectionTransformer {
    source_name: String,
    required: Vec<String>,
    keep: Vec<String>,
}

impl ProjectionTransformer {
    pub fn new(source_name: impl Into<String>, required: Vec<String>, keep: Vec<String>) -> Self {
        ProjectionTransformer {
            source_name: source_name.into(),
            required,
            keep,
        }
    }

    fn project(&self, attributes: &Map<String, Value>) -> Map<String, Value> {
        let mut projected: Map<String, Value> = if self.keep.is_empty() {
            attributes.clone()
        } else {
            self.keep
                .iter()
                .filter_map(|key| attributes.get(key).map(|v| (key.clone(), v.clone())))
                .collect()
        };

        if !projected.contains_key("nelements")
            && let Some(elements) = attributes.get("elements").and_then(Value::as_array)
        {
            projected.insert("nelements".to_string(), Value::from(elements.len()));
        }
        projected.insert("source".to_string(), Value::from(self.source_name.as_str()));
        projected
    }
}

#[async_trait]
impl RowTransformer for ProjectionTransformer {
    fn name(&self) -> &str {
        "projection"
    }

    async fn transform_row(
        &self,
        record: &Record,
        _source: &dyn StructureStore,
    ) -> Result<Vec<Record>, TransformError> {
        let Some(attributes) = record.attributes.as_object() else {
            return Err(TransformError::invalid(&record.id, "attributes are not an object"));
        };

        if let Some(missing) = self
            .required
            .iter()
            .find(|key| attributes.get(*key).is_none_or(Value::is_null))
        {
            debug!("Dropping {}: missing {}", record.id, missing);
            return Ok(Vec::new());
        }

        let output = Record::new(
            record.id.clone(),
            OUTPUT_KIND,
            Value::Object(self.project(attributes)),
        )
        .with_last_modified(record.last_modified);

        Ok(vec![output])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::store::sled_store::SledStructureStore;
    use serde_json::json;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> SledStructureStore {
        let db = sled::open(dir.path()).unwrap();
        SledStructureStore::new(db, "raw", 10).unwrap()
    }

    #[tokio::test]
    async fn projects_and_derives_fields() {
        let dir = TempDir::new().unwrap();
        let transformer = ProjectionTransformer::new(
            "alexandria",
            vec!["elements".into()],
            vec!["elements".into(), "chemical_formula_reduced".into()],
        );
        let record = Record::new(
            "agm1",
            "structures",
            json!({"elements": ["O", "Si"], "chemical_formula_reduced": "O2Si", "band_gap": 5.1}),
        );

        let out = transformer.transform_row(&record, &store(&dir)).await.unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, OUTPUT_KIND);
        assert_eq!(
            out[0].attributes,
            json!({
                "elements": ["O", "Si"],
                "chemical_formula_reduced": "O2Si",
                "nelements": 2,
                "source": "alexandria"
            })
        );
    }

    #[tokio::test]
    async fn drops_records_missing_required_fields() {
        let dir = TempDir::new().unwrap();
        let transformer =
            ProjectionTransformer::new("mp", vec!["elements".into()], Vec::new());
        let record = Record::new("mp-1", "structures", json!({"elements": null}));

        let out = transformer.transform_row(&record, &store(&dir)).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn rejects_non_object_attributes() {
        let dir = TempDir::new().unwrap();
        let transformer = ProjectionTransformer::new("mp", Vec::new(), Vec::new());
        let record = Record::new("mp-2", "structures", json!([1, 2]));

        let err = transformer.transform_row(&record, &store(&dir)).await.unwrap_err();
        assert!(matches!(err, TransformError::Invalid { ref id, .. } if id == "mp-2"));
    }
}

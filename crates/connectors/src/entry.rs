//! Conversion of provider entries into [`Record`]s.

use model::records::record::Record;
use serde_json::{Map, Value};
use thiserror::Error;

pub const DEFAULT_KIND: &str = "structures";

#[derive(Debug, Error, PartialEq)]
pub enum EntryError {
    #[error("entry is not a JSON object")]
    NotAnObject,

    #[error("entry has no usable id")]
    MissingId,

    #[error("attributes of '{0}' are not an object")]
    BadAttributes(String),
}

/// Reads an OPTIMADE-style entry `{"id", "type", "attributes": {...}}`.
///
/// `last_modified` is taken from the top level or, failing that, from the
/// attributes. Numeric ids are accepted and stringified.
pub fn entry_to_record(entry: &Value) -> Result<Record, EntryError> {
    let object = entry.as_object().ok_or(EntryError::NotAnObject)?;

    let id = match object.get("id") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(EntryError::MissingId),
    };

    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_KIND)
        .to_string();

    let attributes = match object.get("attributes") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(attrs @ Value::Object(_)) => attrs.clone(),
        Some(_) => return Err(EntryError::BadAttributes(id)),
    };

    let last_modified = object
        .get("last_modified")
        .or_else(|| attributes.get("last_modified"))
        .and_then(Value::as_str)
        .and_then(Record::parse_timestamp);

    Ok(Record {
        id,
        kind,
        attributes,
        last_modified,
    })
}

/// Best-effort id for log lines about entries that failed to convert.
pub fn entry_id(entry: &Value) -> String {
    match entry.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => "unknown".to_string(),
    }
}

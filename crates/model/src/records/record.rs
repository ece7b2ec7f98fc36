use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The normalized unit of storage. `id` is the upsert key; a later record
/// with the same id replaces the stored row entirely.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: String,

    /// Opaque source document.
    pub attributes: Value,

    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl Record {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, attributes: Value) -> Self {
        Record {
            id: id.into(),
            kind: kind.into(),
            attributes,
            last_modified: None,
        }
    }

    pub fn with_last_modified(mut self, ts: Option<DateTime<Utc>>) -> Self {
        self.last_modified = ts;
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.as_object().and_then(|attrs| attrs.get(key))
    }

    /// Parses an RFC 3339 timestamp, also accepting the zone-less
    /// `YYYY-MM-DDTHH:MM:SS` form many providers emit (read as UTC).
    pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }

        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| chrono::NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }
}

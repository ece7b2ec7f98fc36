use serde::Deserialize;
use serde_json::Value;

/// One page of an OPTIMADE `/structures` response. Only the fields the
/// fetcher reads are modelled; entries stay raw so one malformed entry
/// does not fail the whole page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageResponse {
    #[serde(default)]
    pub data: Vec<Value>,

    #[serde(default)]
    pub meta: PageMeta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageMeta {
    #[serde(default)]
    pub data_returned: Option<u64>,

    #[serde(default)]
    pub more_data_available: Option<bool>,
}

impl PageResponse {
    /// Whether the provider reported there is nothing past this page.
    pub fn is_last(&self) -> bool {
        self.meta.more_data_available == Some(false)
    }
}

use serde::Serialize;
use serde_json::{Map, Value};

/// Unprojected JSON object as returned by the API.
pub type RawResponse = Map<String, Value>;

/// The five fields persisted per run. Missing source keys become empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApodFields {
    pub title: String,
    pub explanation: String,
    pub url: String,
    /// Stored in the `data` column.
    pub date: String,
    pub media_type: String,
}

/// Project the five target keys out of `raw`. No validation happens here.
pub fn transform(raw: &RawResponse) -> ApodFields {
    ApodFields {
        title: field_or_empty(raw, "title"),
        explanation: field_or_empty(raw, "explanation"),
        url: field_or_empty(raw, "url"),
        date: field_or_empty(raw, "date"),
        media_type: field_or_empty(raw, "media_type"),
    }
}

/// Lookup with an empty-string fallback.
///
/// Strings pass through untouched, `null` counts as absent, and any other
/// value is kept as its compact JSON text.
fn field_or_empty(raw: &RawResponse, key: &str) -> String {
    match raw.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

use serde::Serialize;
use serde_json::Value;

/// The assembled, backend-facing request document. Built fresh per terminal
/// call and immutable once dispatched; empty branches are never serialized.
#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    pub index: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Value>,
    pub size: u32,
    pub from: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggs: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,
    #[serde(rename = "_source_include", skip_serializing_if = "Vec::is_empty")]
    pub source_include: Vec<String>,
    #[serde(rename = "_source_exclude", skip_serializing_if = "Vec::is_empty")]
    pub source_exclude: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scroll: Option<String>,
}

impl SearchRequest {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("Failed to serialize search request")
    }
}

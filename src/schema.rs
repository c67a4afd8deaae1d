use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// -----------------------------
/// Validation modes
/// -----------------------------

/// How much checking happens before a clause is compiled.
///
/// Field-path existence is always validated when a field map is configured;
/// `Strict` additionally enforces value/type agreement and rejects range
/// operators on text fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Off,
    ColumnExistenceOnly,
    Strict,
}

/// Options recognized when constructing a compiler instance.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub index_name: String,
    pub key_name: String,
    pub validation: Validation,
}

/// -----------------------------
/// Field mapping
/// -----------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Keyword,
    String,
    Integer,
    Long,
    Short,
    Float,
    Double,
    Date,
    Boolean,
    Nested,
    Object,
    #[serde(other)]
    Other,
}

impl FieldType {
    pub fn is_textual(self) -> bool {
        matches!(self, FieldType::Text | FieldType::String)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Long | FieldType::Short)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubField {
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// Declared metadata for one canonical field name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldMeta {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<FieldMap>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, SubField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<String>,
}

impl FieldMeta {
    /// First declared sub-field of type `keyword`, if any.
    pub fn keyword_sub_field(&self) -> Option<&str> {
        self.fields
            .iter()
            .find(|(_, sub)| sub.field_type == FieldType::Keyword)
            .map(|(name, _)| name.as_str())
    }
}

/// Mapping from canonical field name to its declared metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldMap(pub BTreeMap<String, FieldMeta>);

impl FieldMap {
    pub fn from_value(value: Value) -> Result<Self, Error> {
        serde_json::from_value(value)
            .map_err(|err| Error::Configuration(format!("invalid field map: {err}")))
    }

    pub fn get(&self, name: &str) -> Option<&FieldMeta> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// -----------------------------
/// Path resolution
/// -----------------------------

/// Resolves dotted field paths to canonical names and declared metadata.
///
/// Path segments follow a naming convention: relationship hops are written
/// in upper camel case (`"Orders.amount"`), terminal fields in snake case.
/// Without a field map, resolution degrades to the naming transform alone.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    map: Option<FieldMap>,
}

impl Resolver {
    pub fn new(map: Option<FieldMap>) -> Self {
        Self { map }
    }

    pub fn field_map(&self) -> Option<&FieldMap> {
        self.map.as_ref()
    }

    pub fn has_map(&self) -> bool {
        self.map.is_some()
    }

    /// Resolve `path` to its canonical form and field metadata.
    ///
    /// `is_relation` marks paths whose final segment names a relationship
    /// rather than a terminal field (e.g. the target of a nested query or
    /// aggregation).
    pub fn resolve(&self, path: &str, is_relation: bool) -> Result<(String, FieldMeta), Error> {
        let segments: Vec<&str> = path.split('.').collect();
        match &self.map {
            None => self.resolve_by_convention(path, &segments, is_relation),
            Some(map) => self.resolve_by_map(map, path, &segments, is_relation),
        }
    }

    fn resolve_by_convention(
        &self,
        path: &str,
        segments: &[&str],
        is_relation: bool,
    ) -> Result<(String, FieldMeta), Error> {
        let mut canonical = Vec::with_capacity(segments.len());
        for (i, segment) in segments.iter().enumerate() {
            let last = i == segments.len() - 1;
            if is_canonical(segment) && !last && !is_relation {
                // A dotted path whose hop is already canonical cannot be
                // told apart from a plain field without a map; treating it
                // as valid would silently cross a relationship boundary.
                return Err(Error::InvalidField(path.to_string()));
            }
            canonical.push(to_snake(segment));
        }
        Ok((canonical.join("."), FieldMeta::default()))
    }

    fn resolve_by_map(
        &self,
        map: &FieldMap,
        path: &str,
        segments: &[&str],
        is_relation: bool,
    ) -> Result<(String, FieldMeta), Error> {
        let mut properties = map;
        let mut canonical = Vec::with_capacity(segments.len());
        for (i, segment) in segments.iter().enumerate() {
            let snake = to_snake(segment);
            let Some(meta) = properties.get(&snake) else {
                return Err(Error::InvalidField(path.to_string()));
            };
            canonical.push(snake);
            if i == segments.len() - 1 {
                if !is_relation && meta.properties.is_some() {
                    // A relationship segment cannot terminate a field path.
                    return Err(Error::InvalidField(path.to_string()));
                }
                return Ok((canonical.join("."), meta.clone()));
            }
            properties = meta
                .properties
                .as_ref()
                .ok_or_else(|| Error::InvalidField(path.to_string()))?;
        }
        Err(Error::InvalidField(path.to_string()))
    }
}

/// True when the segment is already in canonical (snake case) form.
pub(crate) fn is_canonical(segment: &str) -> bool {
    segment.to_case(Case::Snake) == segment
}

pub(crate) fn to_snake(segment: &str) -> String {
    if is_canonical(segment) {
        segment.to_string()
    } else {
        segment.to_case(Case::Snake)
    }
}

/// Lenient date-likeness check used by strict value validation.
pub(crate) fn parses_as_date(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value).is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").is_ok()
        || NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

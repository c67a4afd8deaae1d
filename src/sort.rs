use std::str::FromStr;

use serde_json::{Map, Value, json};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            other => Err(Error::Configuration(format!("Invalid order '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SortEntry {
    Field {
        field: String,
        direction: Direction,
        nested_path: Option<String>,
    },
    Script {
        script: Value,
        direction: Direction,
    },
}

/// Ordered sort list. At most one script-based entry is accepted; a second
/// one is a caller error rather than a silent overwrite.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortList {
    entries: Vec<SortEntry>,
}

impl SortList {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[SortEntry] {
        &self.entries
    }

    pub fn push_field(&mut self, field: String, direction: Direction, nested_path: Option<String>) {
        self.entries.push(SortEntry::Field {
            field,
            direction,
            nested_path,
        });
    }

    pub fn push_script(&mut self, script: Value, direction: Direction) -> Result<(), Error> {
        if self
            .entries
            .iter()
            .any(|entry| matches!(entry, SortEntry::Script { .. }))
        {
            return Err(Error::Configuration(
                "a script sort is already registered".to_string(),
            ));
        }
        self.entries.push(SortEntry::Script { script, direction });
        Ok(())
    }

    pub fn to_values(&self) -> Vec<Value> {
        self.entries
            .iter()
            .map(|entry| match entry {
                SortEntry::Field {
                    field,
                    direction,
                    nested_path,
                } => {
                    let mut body = Map::new();
                    body.insert("order".to_string(), direction.as_str().into());
                    if let Some(path) = nested_path {
                        body.insert("nested_path".to_string(), path.as_str().into());
                    }
                    let mut entry = Map::new();
                    entry.insert(field.clone(), Value::Object(body));
                    Value::Object(entry)
                }
                SortEntry::Script { script, direction } => json!({
                    "_script": {
                        "type": "number",
                        "script": script,
                        "order": direction.as_str(),
                    }
                }),
            })
            .collect()
    }
}

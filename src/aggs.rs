use serde_json::{Map, Value, json};

use crate::clause::Clause;
use crate::sort::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Sum,
    Avg,
    Min,
    Max,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Sum => "sum",
            MetricKind::Avg => "avg",
            MetricKind::Min => "min",
            MetricKind::Max => "max",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricTarget {
    Field(String),
    Script(Value),
}

/// A terms bucket accumulated by `group_by`, optionally carrying its own
/// ordering when the sort composer targets `_key`/`_count`.
#[derive(Debug, Clone, PartialEq)]
pub struct TermsBucket {
    pub field: String,
    pub size: Option<u32>,
    pub order: Option<(String, Direction)>,
}

impl TermsBucket {
    pub fn to_value(&self) -> Value {
        let mut body = Map::new();
        body.insert("field".to_string(), self.field.as_str().into());
        if let Some(size) = self.size {
            body.insert("size".to_string(), size.into());
        }
        if let Some((column, direction)) = &self.order {
            let mut order = Map::new();
            order.insert(column.clone(), direction.as_str().into());
            body.insert("order".to_string(), Value::Object(order));
        }
        Value::Object(body)
    }
}

/// One node of the aggregation tree.
#[derive(Debug, Clone, PartialEq)]
pub enum AggNode {
    /// `{terms?, filter?, aggs?}` — terms and filter are mutually exclusive
    /// at one level; the composer rejects the combination before a node is
    /// ever built.
    Bucket {
        terms: Option<TermsBucket>,
        filter: Option<Clause>,
        children: AggMap,
    },
    Metric {
        kind: MetricKind,
        target: MetricTarget,
        missing: Option<f64>,
    },
    Nested {
        path: String,
        children: AggMap,
    },
    Global {
        children: AggMap,
    },
}

impl AggNode {
    pub fn to_value(&self) -> Value {
        match self {
            AggNode::Bucket {
                terms,
                filter,
                children,
            } => {
                let mut body = Map::new();
                if let Some(bucket) = terms {
                    body.insert("terms".to_string(), bucket.to_value());
                }
                if let Some(clause) = filter {
                    body.insert("filter".to_string(), clause.to_value());
                }
                if !children.is_empty() {
                    body.insert("aggs".to_string(), children.to_value());
                }
                Value::Object(body)
            }
            AggNode::Metric {
                kind,
                target,
                missing,
            } => {
                let mut body = Map::new();
                match target {
                    MetricTarget::Field(field) => {
                        body.insert("field".to_string(), field.as_str().into());
                    }
                    MetricTarget::Script(script) => {
                        body.insert("script".to_string(), script.clone());
                    }
                }
                if let Some(missing) = missing {
                    body.insert("missing".to_string(), json!(missing));
                }
                let mut outer = Map::new();
                outer.insert(kind.as_str().to_string(), Value::Object(body));
                Value::Object(outer)
            }
            AggNode::Nested { path, children } => json!({
                "nested": { "path": path },
                "aggs": children.to_value(),
            }),
            AggNode::Global { children } => json!({
                "global": {},
                "aggs": children.to_value(),
            }),
        }
    }
}

/// Insertion-ordered mapping of aggregation name to node. Re-inserting a
/// name replaces the prior node in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggMap {
    entries: Vec<(String, AggNode)>,
}

impl AggMap {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, name: &str) -> Option<&AggNode> {
        self.entries
            .iter()
            .find(|(entry_name, _)| entry_name == name)
            .map(|(_, node)| node)
    }

    pub fn insert(&mut self, name: String, node: AggNode) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|(entry_name, _)| *entry_name == name)
        {
            existing.1 = node;
        } else {
            self.entries.push((name, node));
        }
    }

    pub fn extend(&mut self, other: AggMap) {
        for (name, node) in other.entries {
            self.insert(name, node);
        }
    }

    pub fn to_value(&self) -> Value {
        let mut body = Map::new();
        for (name, node) in &self.entries {
            body.insert(name.clone(), node.to_value());
        }
        Value::Object(body)
    }
}

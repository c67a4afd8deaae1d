use std::str::FromStr;

use serde_json::{Map, Value, json};

use crate::error::Error;
use crate::literal::Literal;
use crate::schema;

/// -----------------------------
/// Operators and combinators
/// -----------------------------

/// The available clause operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Lt,
    Gt,
    Lte,
    Gte,
    Like,
    Ne,
    Wildcard,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Lte => "<=",
            Operator::Gte => ">=",
            Operator::Like => "like",
            Operator::Ne => "!=",
            Operator::Wildcard => "*",
        }
    }

    /// Backend-native range key, for the four range operators.
    pub fn range_key(self) -> Option<&'static str> {
        match self {
            Operator::Lt => Some("lt"),
            Operator::Gt => Some("gt"),
            Operator::Lte => Some("lte"),
            Operator::Gte => Some("gte"),
            _ => None,
        }
    }

    pub fn is_range(self) -> bool {
        self.range_key().is_some()
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().as_str() {
            "=" => Ok(Operator::Eq),
            "<" => Ok(Operator::Lt),
            ">" => Ok(Operator::Gt),
            "<=" => Ok(Operator::Lte),
            ">=" => Ok(Operator::Gte),
            "like" => Ok(Operator::Like),
            "!=" => Ok(Operator::Ne),
            "*" => Ok(Operator::Wildcard),
            other => Err(Error::InvalidOperator(format!(
                "unsupported operator '{other}'"
            ))),
        }
    }
}

/// AND/OR join semantics governing which boolean bucket a clause lands in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Combinator {
    #[default]
    And,
    Or,
}

/// -----------------------------
/// Compiled clause tree
/// -----------------------------

/// One compiled unit of a boolean query tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Term {
        field: String,
        value: Literal,
    },
    Terms {
        field: String,
        values: Vec<Literal>,
    },
    Range {
        field: String,
        op: Operator,
        value: Literal,
    },
    Match {
        field: String,
        query: Value,
    },
    Wildcard {
        field: String,
        pattern: Literal,
    },
    Exists {
        field: String,
    },
    Nested {
        path: String,
        query: Box<Clause>,
    },
    ConstantScore {
        filter: Box<Clause>,
        boost: f32,
    },
    Bool(BoolQuery),
}

impl Clause {
    pub fn to_value(&self) -> Value {
        match self {
            Clause::Term { field, value } => keyed("term", field, value.to_json()),
            Clause::Terms { field, values } => keyed(
                "terms",
                field,
                Value::Array(values.iter().map(Literal::to_json).collect()),
            ),
            Clause::Range { field, op, value } => {
                let key = op.range_key().unwrap_or("gte");
                let mut bound = Map::new();
                bound.insert(key.to_string(), value.to_json());
                keyed("range", field, Value::Object(bound))
            }
            Clause::Match { field, query } => keyed("match", field, query.clone()),
            Clause::Wildcard { field, pattern } => keyed("wildcard", field, pattern.to_json()),
            Clause::Exists { field } => json!({ "exists": { "field": field } }),
            Clause::Nested { path, query } => json!({
                "nested": { "path": path, "query": query.to_value() }
            }),
            Clause::ConstantScore { filter, boost } => json!({
                "constant_score": { "filter": filter.to_value(), "boost": boost }
            }),
            Clause::Bool(bool_query) => bool_query
                .to_value()
                .unwrap_or_else(|| json!({ "bool": {} })),
        }
    }
}

fn keyed(kind: &str, field: &str, inner: Value) -> Value {
    let mut body = Map::new();
    body.insert(field.to_string(), inner);
    let mut outer = Map::new();
    outer.insert(kind.to_string(), Value::Object(body));
    Value::Object(outer)
}

/// The composite clause: four boolean buckets plus the should-quorum.
///
/// Appending to `should` is expected to set `minimum_should_match` so that
/// OR clauses are never vacuously satisfied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    pub must: Vec<Clause>,
    pub should: Vec<Clause>,
    pub filter: Vec<Clause>,
    pub must_not: Vec<Clause>,
    pub minimum_should_match: Option<u32>,
}

impl BoolQuery {
    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
            && self.should.is_empty()
            && self.filter.is_empty()
            && self.must_not.is_empty()
            && self.minimum_should_match.is_none()
    }

    /// Emit the `{"bool": ...}` document, or `None` when every branch is
    /// empty. Branches are only written when non-empty, so the compiled
    /// output never carries vacuous placeholders; explicit zero values
    /// survive because emptiness is structural, not value-based.
    pub fn to_value(&self) -> Option<Value> {
        if self.is_empty() {
            return None;
        }
        let mut body = Map::new();
        let buckets = [
            ("must", &self.must),
            ("should", &self.should),
            ("filter", &self.filter),
            ("must_not", &self.must_not),
        ];
        for (name, clauses) in buckets {
            if !clauses.is_empty() {
                body.insert(
                    name.to_string(),
                    Value::Array(clauses.iter().map(Clause::to_value).collect()),
                );
            }
        }
        if let Some(quorum) = self.minimum_should_match {
            body.insert("minimum_should_match".to_string(), quorum.into());
        }
        Some(json!({ "bool": body }))
    }
}

/// -----------------------------
/// Nested-path wrapping
/// -----------------------------

/// Wrap `inner` in nested-query layers for every relationship boundary the
/// path crosses. Returns `None` when every segment is already canonical —
/// callers must treat that as "not nested".
pub fn wrap_nested(path: &str, inner: Clause) -> Option<Clause> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().all(|s| schema::is_canonical(s)) {
        return None;
    }
    Some(wrap(&segments, inner, String::new()))
}

fn wrap(segments: &[&str], inner: Clause, prefix: String) -> Clause {
    let head = schema::to_snake(segments[0]);
    let path = if prefix.is_empty() {
        head
    } else {
        format!("{prefix}.{head}")
    };
    let rest = &segments[1..];
    let query = if rest.is_empty() || rest.iter().all(|s| schema::is_canonical(s)) {
        inner
    } else {
        wrap(rest, inner, path.clone())
    };
    Clause::Nested {
        path,
        query: Box::new(query),
    }
}

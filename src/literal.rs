use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A comparison value accepted by the predicate methods.
///
/// `Null` is never serialized into a term clause; the predicate compiler
/// turns it into an existence check instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<Literal>),
}

impl Literal {
    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Literal::Array(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Literal::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Literal]> {
        match self {
            Literal::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Infallible JSON projection of the literal.
    pub fn to_json(&self) -> Value {
        match self {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::Number((*i).into()),
            Literal::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Literal::String(s) => Value::String(s.clone()),
            Literal::Date(d) => Value::String(d.to_rfc3339()),
            Literal::Array(items) => Value::Array(items.iter().map(Literal::to_json).collect()),
        }
    }
}

// Helper trait to convert types to Literal
pub trait ToLiteral {
    fn to_literal(&self) -> Literal;
}

impl ToLiteral for Literal {
    fn to_literal(&self) -> Literal {
        self.clone()
    }
}

impl ToLiteral for String {
    fn to_literal(&self) -> Literal {
        Literal::String(self.clone())
    }
}

impl ToLiteral for &str {
    fn to_literal(&self) -> Literal {
        Literal::String(self.to_string())
    }
}

impl ToLiteral for i64 {
    fn to_literal(&self) -> Literal {
        Literal::Int(*self)
    }
}

impl ToLiteral for i32 {
    fn to_literal(&self) -> Literal {
        Literal::Int(*self as i64)
    }
}

impl ToLiteral for u32 {
    fn to_literal(&self) -> Literal {
        Literal::Int(*self as i64)
    }
}

impl ToLiteral for f64 {
    fn to_literal(&self) -> Literal {
        Literal::Float(*self)
    }
}

impl ToLiteral for f32 {
    fn to_literal(&self) -> Literal {
        Literal::Float(*self as f64)
    }
}

impl ToLiteral for bool {
    fn to_literal(&self) -> Literal {
        Literal::Bool(*self)
    }
}

impl ToLiteral for DateTime<Utc> {
    fn to_literal(&self) -> Literal {
        Literal::Date(*self)
    }
}

impl<T: ToLiteral> ToLiteral for Option<T> {
    fn to_literal(&self) -> Literal {
        match self {
            Some(value) => value.to_literal(),
            None => Literal::Null,
        }
    }
}

impl<T: ToLiteral> ToLiteral for Vec<T> {
    fn to_literal(&self) -> Literal {
        Literal::Array(self.iter().map(ToLiteral::to_literal).collect())
    }
}

impl<T: ToLiteral> ToLiteral for &[T] {
    fn to_literal(&self) -> Literal {
        Literal::Array(self.iter().map(ToLiteral::to_literal).collect())
    }
}

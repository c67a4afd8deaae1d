//! # Zetesis
//!
//! *ζήτησις — Ancient Greek for "search" or "inquiry".*
//!
//! Zetesis is a fluent filter-expression compiler for document-search
//! backends. A chain of predicate, sort and aggregation calls is compiled
//! into a structured, nested boolean query tree, validated against a
//! declared field mapping, and assembled into one backend-facing request
//! document.
//!
//! ## What's inside
//!
//! ### Schema-driven field resolution
//! Dotted field paths are resolved segment by segment against a declared
//! mapping. Relationship hops are written in upper camel case
//! (`"Orders.amount"`), terminal fields in snake case; every referenced
//! field must be known before a clause is compiled.
//!
//! ### Boolean expression trees
//! Predicates land in the right bucket of a boolean query — `filter` for
//! cacheable AND clauses, `must` for scored full text, `should` with a
//! quorum of one for OR semantics, `must_not` for negation — and compose
//! through callback-based grouping with child compilers.
//!
//! ### Nested relationship queries
//! A predicate on a field across a one-to-many relationship is wrapped in
//! nested-path layers, innermost relation first, so sibling relationship
//! instances are never cross-matched.
//!
//! ### Aggregation trees
//! Terms buckets, metric aggregations, nested and global scopes compose
//! into named trees, with eager rejection of a terms bucket and a filter
//! at the same level.
//!
//! ```rust,ignore
//! use zetesis::{Direction, QueryBuilder};
//!
//! let results = QueryBuilder::new(client, &schema)
//!     .where_eq("status", "active")?
//!     .where_has("Orders", |q| q.where_op("amount", Operator::Gte, 100))?
//!     .order_by("listed_at", Direction::Desc)?
//!     .page(1, 25)
//!     .get()
//!     .await?;
//! let rows = results.rows();
//! ```
//!
//! Transport, hydration and configuration loading stay behind the
//! [`SearchClient`], [`RecordFactory`] and [`SchemaProvider`] boundary
//! traits.

pub mod adapters;
pub mod aggs;
pub mod builder;
pub mod clause;
pub mod error;
pub mod literal;
pub mod request;
pub mod schema;
pub mod sort;

pub use crate::adapters::{RecordFactory, Row, SchemaProvider, SearchClient};
pub use crate::aggs::{AggMap, AggNode, MetricKind, MetricTarget, TermsBucket};
pub use crate::builder::{Pagination, QueryBuilder};
pub use crate::clause::{BoolQuery, Clause, Combinator, Operator, wrap_nested};
pub use crate::error::Error;
pub use crate::literal::{Literal, ToLiteral};
pub use crate::request::SearchRequest;
pub use crate::schema::{
    FieldMap, FieldMeta, FieldType, Resolver, SearchConfig, SubField, Validation,
};
pub use crate::sort::{Direction, SortEntry, SortList};

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use serde_json::{Map, Value, json};

use crate::adapters::{RecordFactory, Row, SchemaProvider, SearchClient};
use crate::aggs::{AggMap, AggNode, MetricKind, MetricTarget, TermsBucket};
use crate::clause::{BoolQuery, Clause, Combinator, Operator, wrap_nested};
use crate::error::Error;
use crate::literal::{Literal, ToLiteral};
use crate::request::SearchRequest;
use crate::schema::{self, FieldMap, FieldMeta, FieldType, Resolver, SearchConfig, Validation};
use crate::sort::{Direction, SortList};

/// Fallback page size when no explicit limit was set.
const DEFAULT_SIZE: u32 = 100;

/// Width of the page-number window computed by `pagination`.
const PAGINATION_WINDOW: u64 = 5;

/// Sentinel compared against the key field so that an empty value set
/// matches zero documents instead of all of them.
const EMPTY_SET_SENTINEL: i64 = -9999;

enum MatchMode {
    Must,
    MustNot,
    Should,
}

/// The fluent filter-expression compiler.
///
/// Accumulates predicates, sorts and aggregations, assembles them into one
/// request document on a terminal call, and wraps the raw reply for
/// projection. One builder serves one logical caller; child builders
/// created for callback grouping are merged back by value.
pub struct QueryBuilder {
    client: Arc<dyn SearchClient>,
    resolver: Resolver,
    config: SearchConfig,
    prefix: Option<String>,
    expr: BoolQuery,
    bucket: Option<TermsBucket>,
    aggs: AggMap,
    order: SortList,
    limit: u32,
    offset: u32,
    page: u32,
    records_per_page: Option<u32>,
    source_include: Vec<String>,
    source_exclude: Vec<String>,
    min_score: Option<f64>,
    scroll_window: Option<(String, u32)>,
    raw_results: Option<Value>,
}

impl std::fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("client", &"<dyn SearchClient>")
            .field("resolver", &self.resolver)
            .field("config", &self.config)
            .field("prefix", &self.prefix)
            .field("expr", &self.expr)
            .field("bucket", &self.bucket)
            .field("aggs", &self.aggs)
            .field("order", &self.order)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("page", &self.page)
            .field("records_per_page", &self.records_per_page)
            .field("source_include", &self.source_include)
            .field("source_exclude", &self.source_exclude)
            .field("min_score", &self.min_score)
            .field("scroll_window", &self.scroll_window)
            .field("raw_results", &self.raw_results)
            .finish()
    }
}

/// Page-boundary projection of a search reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Pagination {
    pub pages: Vec<u64>,
    pub rows: u64,
    pub active: u64,
    pub total_pages: u64,
    pub has_prev: bool,
    pub has_next: bool,
    pub per_page: u32,
}

impl QueryBuilder {
    /// Construct from a schema provider. Validation defaults to `Strict`
    /// when a field map is declared, `Off` otherwise.
    pub fn new(client: Arc<dyn SearchClient>, provider: &impl SchemaProvider) -> Self {
        let field_map = provider.field_map();
        let validation = if field_map.is_some() {
            Validation::Strict
        } else {
            Validation::Off
        };
        Self::with_config(
            client,
            field_map,
            SearchConfig {
                index_name: provider.index_name().to_string(),
                key_name: provider.key_name().to_string(),
                validation,
            },
        )
    }

    /// Construct from an explicit configuration.
    pub fn with_config(
        client: Arc<dyn SearchClient>,
        field_map: Option<FieldMap>,
        config: SearchConfig,
    ) -> Self {
        Self {
            client,
            resolver: Resolver::new(field_map),
            config,
            prefix: None,
            expr: BoolQuery::default(),
            bucket: None,
            aggs: AggMap::default(),
            order: SortList::default(),
            limit: 0,
            offset: 0,
            page: 0,
            records_per_page: None,
            source_include: Vec::new(),
            source_exclude: Vec::new(),
            min_score: None,
            scroll_window: None,
            raw_results: None,
        }
    }

    pub fn index_name(&self) -> &str {
        &self.config.index_name
    }

    pub fn key_name(&self) -> &str {
        &self.config.key_name
    }

    pub fn validation(&self) -> Validation {
        self.config.validation
    }

    /// Fresh builder sharing schema, config and client, used for callback
    /// grouping and relationship-scoped sub-expressions.
    fn child(&self, prefix: Option<String>) -> Self {
        Self {
            client: Arc::clone(&self.client),
            resolver: self.resolver.clone(),
            config: self.config.clone(),
            prefix,
            expr: BoolQuery::default(),
            bucket: None,
            aggs: AggMap::default(),
            order: SortList::default(),
            limit: 0,
            offset: 0,
            page: 0,
            records_per_page: None,
            source_include: Vec::new(),
            source_exclude: Vec::new(),
            min_score: None,
            scroll_window: None,
            raw_results: None,
        }
    }

    fn prefixed(&self, column: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}.{column}"),
            None => column.to_string(),
        }
    }

    fn resolve(&self, column: &str, is_relation: bool) -> Result<(String, FieldMeta), Error> {
        self.resolver.resolve(&self.prefixed(column), is_relation)
    }

    // ==================== Predicates ====================

    /// Two-argument convention: equality against a literal value. A null
    /// value compiles to a negated existence check, never a null term.
    pub fn where_eq(self, column: &str, value: impl ToLiteral) -> Result<Self, Error> {
        self.compile_where(column, Operator::Eq, value.to_literal(), Combinator::And)
    }

    pub fn or_eq(self, column: &str, value: impl ToLiteral) -> Result<Self, Error> {
        self.compile_where(column, Operator::Eq, value.to_literal(), Combinator::Or)
    }

    /// Explicit-operator predicate.
    pub fn where_op(
        self,
        column: &str,
        op: Operator,
        value: impl ToLiteral,
    ) -> Result<Self, Error> {
        self.compile_where(column, op, value.to_literal(), Combinator::And)
    }

    pub fn or_op(self, column: &str, op: Operator, value: impl ToLiteral) -> Result<Self, Error> {
        self.compile_where(column, op, value.to_literal(), Combinator::Or)
    }

    pub fn where_ne(self, column: &str, value: impl ToLiteral) -> Result<Self, Error> {
        self.compile_where(column, Operator::Ne, value.to_literal(), Combinator::And)
    }

    pub fn or_ne(self, column: &str, value: impl ToLiteral) -> Result<Self, Error> {
        self.compile_where(column, Operator::Ne, value.to_literal(), Combinator::Or)
    }

    pub fn where_null(self, column: &str) -> Result<Self, Error> {
        self.compile_where(column, Operator::Eq, Literal::Null, Combinator::And)
    }

    pub fn where_not_null(self, column: &str) -> Result<Self, Error> {
        self.compile_where(column, Operator::Ne, Literal::Null, Combinator::And)
    }

    /// Full-text match; scored even under AND semantics.
    pub fn where_like(self, column: &str, value: impl ToLiteral) -> Result<Self, Error> {
        self.compile_where(column, Operator::Like, value.to_literal(), Combinator::And)
    }

    pub fn where_wildcard(self, column: &str, pattern: impl ToLiteral) -> Result<Self, Error> {
        self.compile_where(
            column,
            Operator::Wildcard,
            pattern.to_literal(),
            Combinator::And,
        )
    }

    fn compile_where(
        mut self,
        column: &str,
        op: Operator,
        value: Literal,
        combinator: Combinator,
    ) -> Result<Self, Error> {
        let (canonical, meta) = self.resolve(column, false)?;
        self.check_range_operator(&canonical, op, &meta)?;
        self.validate_value(&canonical, &meta, &value)?;
        let or = combinator == Combinator::Or;
        match op {
            Operator::Eq => {
                let clause = if value.is_null() {
                    Clause::Bool(BoolQuery {
                        must_not: vec![Clause::Exists { field: canonical }],
                        ..Default::default()
                    })
                } else {
                    Clause::Term {
                        field: canonical,
                        value,
                    }
                };
                self.push_clause(clause, or, false);
            }
            Operator::Lt | Operator::Gt | Operator::Lte | Operator::Gte => {
                self.push_clause(
                    Clause::Range {
                        field: canonical,
                        op,
                        value,
                    },
                    or,
                    false,
                );
            }
            Operator::Like => {
                self.push_clause(
                    Clause::Match {
                        field: canonical,
                        query: value.to_json(),
                    },
                    or,
                    true,
                );
            }
            Operator::Wildcard => {
                self.push_clause(
                    Clause::Wildcard {
                        field: canonical,
                        pattern: value,
                    },
                    or,
                    false,
                );
            }
            Operator::Ne => self.compile_negation(canonical, value, or),
        }
        Ok(self)
    }

    /// The four `!=` shapes: {AND, OR} x {null, non-null}.
    fn compile_negation(&mut self, field: String, value: Literal, or: bool) {
        match (or, value.is_null()) {
            (false, true) => self.expr.filter.push(Clause::Exists { field }),
            (false, false) => self.expr.must_not.push(term_or_terms(field, value)),
            (true, true) => {
                self.expr.should.push(Clause::Exists { field });
                self.expr.minimum_should_match = Some(1);
            }
            (true, false) => {
                self.expr.should.push(Clause::Bool(BoolQuery {
                    must_not: vec![term_or_terms(field, value)],
                    ..Default::default()
                }));
                self.expr.minimum_should_match = Some(1);
            }
        }
    }

    /// AND clauses land in `filter` (non-scored, cacheable) unless the
    /// clause is scored full text, which belongs in `must`.
    fn push_clause(&mut self, clause: Clause, or: bool, scored: bool) {
        if or {
            self.expr.should.push(clause);
            self.expr.minimum_should_match = Some(1);
        } else if scored {
            self.expr.must.push(clause);
        } else {
            self.expr.filter.push(clause);
        }
    }

    fn check_range_operator(
        &self,
        column: &str,
        op: Operator,
        meta: &FieldMeta,
    ) -> Result<(), Error> {
        if self.config.validation != Validation::Strict || !op.is_range() {
            return Ok(());
        }
        if meta.field_type.is_some_and(|t| t.is_textual()) {
            return Err(Error::InvalidOperator(format!(
                "range operator on text field '{column}'"
            )));
        }
        Ok(())
    }

    fn validate_value(&self, column: &str, meta: &FieldMeta, value: &Literal) -> Result<(), Error> {
        if value.is_null() || self.config.validation != Validation::Strict {
            return Ok(());
        }
        let Some(field_type) = meta.field_type else {
            return Ok(());
        };
        if field_type.is_integer() {
            let ok = matches!(value, Literal::Int(_) | Literal::Array(_))
                || matches!(value, Literal::String(s)
                    if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()));
            if !ok {
                return Err(Error::Validation(format!(
                    "Integer value required for column '{column}'. Index name: {}",
                    self.config.index_name
                )));
            }
        } else if field_type == FieldType::Date {
            let ok = matches!(value, Literal::Date(_) | Literal::Array(_))
                || matches!(value, Literal::String(s) if schema::parses_as_date(s));
            if !ok {
                return Err(Error::Validation(format!(
                    "Date value required for column '{column}'. Index name: {}",
                    self.config.index_name
                )));
            }
        }
        Ok(())
    }

    // ==================== Set predicates ====================

    pub fn where_in<T: ToLiteral>(self, column: &str, values: &[T]) -> Result<Self, Error> {
        self.compile_in(column, values, Combinator::And)
    }

    pub fn or_in<T: ToLiteral>(self, column: &str, values: &[T]) -> Result<Self, Error> {
        self.compile_in(column, values, Combinator::Or)
    }

    pub fn where_not_in<T: ToLiteral>(self, column: &str, values: &[T]) -> Result<Self, Error> {
        self.compile_not_in(column, values, Combinator::And)
    }

    pub fn or_not_in<T: ToLiteral>(self, column: &str, values: &[T]) -> Result<Self, Error> {
        self.compile_not_in(column, values, Combinator::Or)
    }

    fn compile_in<T: ToLiteral>(
        mut self,
        column: &str,
        values: &[T],
        combinator: Combinator,
    ) -> Result<Self, Error> {
        if values.is_empty() {
            self.push_empty_set_guard();
            return Ok(self);
        }
        let (canonical, _) = self.resolve(column, false)?;
        let literals = values.iter().map(ToLiteral::to_literal).collect();
        self.push_clause(
            Clause::Terms {
                field: canonical,
                values: literals,
            },
            combinator == Combinator::Or,
            false,
        );
        Ok(self)
    }

    fn compile_not_in<T: ToLiteral>(
        mut self,
        column: &str,
        values: &[T],
        combinator: Combinator,
    ) -> Result<Self, Error> {
        if values.is_empty() {
            self.push_empty_set_guard();
            return Ok(self);
        }
        let (canonical, _) = self.resolve(column, false)?;
        let clause = Clause::Terms {
            field: canonical,
            values: values.iter().map(ToLiteral::to_literal).collect(),
        };
        match combinator {
            Combinator::And => self.expr.must_not.push(clause),
            Combinator::Or => {
                self.expr.should.push(Clause::Bool(BoolQuery {
                    must_not: vec![clause],
                    ..Default::default()
                }));
                self.expr.minimum_should_match = Some(1);
            }
        }
        Ok(self)
    }

    /// Fail closed: a predicate over the empty set must match nothing.
    fn push_empty_set_guard(&mut self) {
        let field = self.config.key_name.clone();
        self.expr.filter.push(Clause::Term {
            field,
            value: Literal::Int(EMPTY_SET_SENTINEL),
        });
    }

    pub fn where_between(
        self,
        column: &str,
        from: impl ToLiteral,
        to: impl ToLiteral,
    ) -> Result<Self, Error> {
        let (from, to) = (from.to_literal(), to.to_literal());
        if from.is_null() && to.is_null() {
            return Err(Error::Configuration(
                "either from or to is required".to_string(),
            ));
        }
        let mut builder = self;
        if !from.is_null() {
            builder = builder.compile_where(column, Operator::Gte, from, Combinator::And)?;
        }
        if !to.is_null() {
            builder = builder.compile_where(column, Operator::Lte, to, Combinator::And)?;
        }
        Ok(builder)
    }

    pub fn or_between(
        self,
        column: &str,
        from: impl ToLiteral,
        to: impl ToLiteral,
    ) -> Result<Self, Error> {
        let (from, to) = (from.to_literal(), to.to_literal());
        if from.is_null() && to.is_null() {
            return Err(Error::Configuration(
                "either from or to is required".to_string(),
            ));
        }
        let column = column.to_string();
        self.or_group(move |group| group.where_between(&column, from, to))
    }

    // ==================== Full-text predicates ====================

    pub fn where_match(self, column: &str, value: impl ToLiteral) -> Result<Self, Error> {
        self.compile_match(column, Some(value.to_literal()), None, MatchMode::Must)
    }

    pub fn or_match(self, column: &str, value: impl ToLiteral) -> Result<Self, Error> {
        self.compile_match(column, Some(value.to_literal()), None, MatchMode::Should)
    }

    pub fn where_doesnt_match(self, column: &str, value: impl ToLiteral) -> Result<Self, Error> {
        self.compile_match(column, Some(value.to_literal()), None, MatchMode::MustNot)
    }

    /// Match with backend options (`analyzer`, `operator`, `fuzziness`, …).
    /// Providing neither a value nor a `query` option is a caller error.
    pub fn where_match_with(
        self,
        column: &str,
        value: Option<Literal>,
        options: Map<String, Value>,
    ) -> Result<Self, Error> {
        self.compile_match(column, value, Some(options), MatchMode::Must)
    }

    pub fn where_doesnt_match_with(
        self,
        column: &str,
        value: Option<Literal>,
        options: Map<String, Value>,
    ) -> Result<Self, Error> {
        self.compile_match(column, value, Some(options), MatchMode::MustNot)
    }

    pub fn or_match_with(
        self,
        column: &str,
        value: Option<Literal>,
        options: Map<String, Value>,
    ) -> Result<Self, Error> {
        self.compile_match(column, value, Some(options), MatchMode::Should)
    }

    fn compile_match(
        mut self,
        column: &str,
        value: Option<Literal>,
        options: Option<Map<String, Value>>,
        mode: MatchMode,
    ) -> Result<Self, Error> {
        let (canonical, meta) = self.resolve(column, false)?;
        if let Some(v) = &value {
            self.validate_value(&canonical, &meta, v)?;
        }
        let query = match options {
            Some(mut options) => {
                match value {
                    Some(v) if !v.is_null() => {
                        options.insert("query".to_string(), v.to_json());
                    }
                    _ => {
                        if !options.contains_key("query") {
                            return Err(Error::Configuration(
                                "either a value or a 'query' option is required".to_string(),
                            ));
                        }
                    }
                }
                Value::Object(options)
            }
            None => value.map(|v| v.to_json()).unwrap_or(Value::Null),
        };
        let clause = Clause::Match {
            field: canonical,
            query,
        };
        match mode {
            MatchMode::Must => self.expr.must.push(clause),
            MatchMode::MustNot => self.expr.must_not.push(clause),
            MatchMode::Should => {
                self.expr.should.push(clause);
                self.expr.minimum_should_match = Some(1);
            }
        }
        Ok(self)
    }

    // ==================== Grouping ====================

    /// AND-group: the callback populates a child compiler whose compiled
    /// tree is merged back as a single `must` entry.
    pub fn where_group(
        mut self,
        f: impl FnOnce(Self) -> Result<Self, Error>,
    ) -> Result<Self, Error> {
        let mut child = f(self.child(self.prefix.clone()))?;
        child.expr.minimum_should_match = Some(1);
        self.expr.must.push(Clause::Bool(child.expr));
        Ok(self)
    }

    /// OR-group: merged as a single `should` entry with a quorum of one on
    /// the enclosing tree.
    pub fn or_group(mut self, f: impl FnOnce(Self) -> Result<Self, Error>) -> Result<Self, Error> {
        let child = f(self.child(self.prefix.clone()))?;
        self.expr.should.push(Clause::Bool(child.expr));
        self.expr.minimum_should_match = Some(1);
        Ok(self)
    }

    // ==================== Relationship predicates ====================

    /// Constrain a one-to-many relationship: the callback populates a child
    /// compiler scoped to the relationship prefix, and the compiled tree is
    /// wrapped in nested-path layers.
    pub fn where_has(
        self,
        column: &str,
        f: impl FnOnce(Self) -> Result<Self, Error>,
    ) -> Result<Self, Error> {
        self.compile_has(column, f, Combinator::And, None)
    }

    pub fn or_where_has(
        self,
        column: &str,
        f: impl FnOnce(Self) -> Result<Self, Error>,
    ) -> Result<Self, Error> {
        self.compile_has(column, f, Combinator::Or, None)
    }

    /// Like `where_has`, but rewrites the wrapped clause as a scored
    /// constant-score filter.
    pub fn where_has_boosted(
        self,
        column: &str,
        f: impl FnOnce(Self) -> Result<Self, Error>,
        boost: f32,
    ) -> Result<Self, Error> {
        self.compile_has(column, f, Combinator::And, Some(boost))
    }

    pub fn or_where_has_boosted(
        self,
        column: &str,
        f: impl FnOnce(Self) -> Result<Self, Error>,
        boost: f32,
    ) -> Result<Self, Error> {
        self.compile_has(column, f, Combinator::Or, Some(boost))
    }

    fn compile_has(
        mut self,
        column: &str,
        f: impl FnOnce(Self) -> Result<Self, Error>,
        combinator: Combinator,
        boost: Option<f32>,
    ) -> Result<Self, Error> {
        let full_path = self.prefixed(column);
        self.resolve(column, true)?;
        let child = f(self.child(Some(full_path.clone())))?;
        if child.expr.is_empty() {
            return Ok(self);
        }
        let wrapped = wrap_nested(&full_path, Clause::Bool(child.expr)).ok_or_else(|| {
            Error::InvalidField(format!("'{full_path}' is not a relationship path"))
        })?;
        let clause = match boost {
            Some(boost) => Clause::ConstantScore {
                filter: Box::new(wrapped),
                boost,
            },
            None => wrapped,
        };
        self.push_clause(clause, combinator == Combinator::Or, false);
        Ok(self)
    }

    /// Assert a relationship has no nested documents at all.
    pub fn where_has_null(self, column: &str) -> Result<Self, Error> {
        self.compile_has_null(column, Combinator::And)
    }

    pub fn or_where_has_null(self, column: &str) -> Result<Self, Error> {
        self.compile_has_null(column, Combinator::Or)
    }

    fn compile_has_null(mut self, column: &str, combinator: Combinator) -> Result<Self, Error> {
        let (canonical, _) = self.resolve(column, true)?;
        let nested = Clause::Nested {
            path: canonical.clone(),
            query: Box::new(Clause::Exists { field: canonical }),
        };
        let clause = Clause::Bool(BoolQuery {
            must_not: vec![nested],
            ..Default::default()
        });
        self.push_clause(clause, combinator == Combinator::Or, false);
        Ok(self)
    }

    /// Structural negation of `where_has`: matches documents where no
    /// nested element satisfies the callback's predicate.
    pub fn where_has_null_matching(
        self,
        column: &str,
        f: impl FnOnce(Self) -> Result<Self, Error>,
    ) -> Result<Self, Error> {
        self.compile_has_null_matching(column, f, Combinator::And)
    }

    pub fn or_where_has_null_matching(
        self,
        column: &str,
        f: impl FnOnce(Self) -> Result<Self, Error>,
    ) -> Result<Self, Error> {
        self.compile_has_null_matching(column, f, Combinator::Or)
    }

    fn compile_has_null_matching(
        mut self,
        column: &str,
        f: impl FnOnce(Self) -> Result<Self, Error>,
        combinator: Combinator,
    ) -> Result<Self, Error> {
        let full_path = self.prefixed(column);
        self.resolve(column, true)?;
        let child = f(self.child(Some(full_path.clone())))?;
        if child.expr.is_empty() {
            return Ok(self);
        }
        let wrapped = wrap_nested(&full_path, Clause::Bool(child.expr)).ok_or_else(|| {
            Error::InvalidField(format!("'{full_path}' is not a relationship path"))
        })?;
        let clause = Clause::Bool(BoolQuery {
            must_not: vec![wrapped],
            ..Default::default()
        });
        self.push_clause(clause, combinator == Combinator::Or, false);
        Ok(self)
    }

    // ==================== Aggregations ====================

    /// Terms bucket over `column`. A zero or absent size accepts the
    /// backend's default bucket cap.
    pub fn group_by(mut self, column: &str, size: Option<u32>) -> Result<Self, Error> {
        let (canonical, _) = self.resolve(column, false)?;
        self.bucket = Some(TermsBucket {
            field: canonical,
            size: size.filter(|s| *s != 0),
            order: None,
        });
        Ok(self)
    }

    /// Named aggregation built from a child compiler. A terms bucket and a
    /// filter expression at the same level conflict; a pass-through level
    /// carrying only child aggregations is flattened into this one.
    pub fn aggregate(
        mut self,
        name: &str,
        f: impl FnOnce(Self) -> Result<Self, Error>,
    ) -> Result<Self, Error> {
        let child = f(self.child(self.prefix.clone()))?;
        let has_terms = child.bucket.is_some();
        let has_filter = !child.expr.is_empty();
        if has_terms && has_filter {
            return Err(Error::AggregationConflict(
                "'group_by' and 'where' at the same aggregation level; use a nested aggregate instead"
                    .to_string(),
            ));
        }
        if !has_terms && !has_filter {
            if !child.aggs.is_empty() {
                self.aggs.extend(child.aggs);
            }
            return Ok(self);
        }
        let filter = has_filter.then(|| Clause::Bool(child.expr));
        self.aggs.insert(
            name.to_string(),
            AggNode::Bucket {
                terms: child.bucket,
                filter,
                children: child.aggs,
            },
        );
        Ok(self)
    }

    /// Aggregation over all documents, ignoring the active predicate set.
    /// Stored under `all_<name>`.
    pub fn aggregate_all(
        mut self,
        name: &str,
        f: impl FnOnce(Self) -> Result<Self, Error>,
    ) -> Result<Self, Error> {
        let child = self.child(self.prefix.clone()).aggregate(name, f)?;
        self.aggs.insert(
            format!("all_{name}"),
            AggNode::Global {
                children: child.aggs,
            },
        );
        Ok(self)
    }

    /// Aggregation scoped to a relationship, wrapped in a nested bucket
    /// keyed by the canonical relation path.
    pub fn aggregate_on(
        self,
        relation: &str,
        f: impl FnOnce(Self) -> Result<Self, Error>,
    ) -> Result<Self, Error> {
        self.compile_aggregate_on(relation, f, None)
    }

    pub fn aggregate_on_named(
        self,
        relation: &str,
        f: impl FnOnce(Self) -> Result<Self, Error>,
        name: &str,
    ) -> Result<Self, Error> {
        self.compile_aggregate_on(relation, f, Some(name))
    }

    fn compile_aggregate_on(
        mut self,
        relation: &str,
        f: impl FnOnce(Self) -> Result<Self, Error>,
        custom_name: Option<&str>,
    ) -> Result<Self, Error> {
        let (canonical, _) = self.resolve(relation, true)?;
        let name = custom_name
            .map(str::to_string)
            .unwrap_or_else(|| canonical.clone());
        let full_path = self.prefixed(relation);
        let child = self.child(Some(full_path)).aggregate(&name, f)?;
        self.aggs.insert(
            name,
            AggNode::Nested {
                path: canonical,
                children: child.aggs,
            },
        );
        Ok(self)
    }

    pub fn sum(
        self,
        column: &str,
        name: Option<&str>,
        missing: Option<f64>,
    ) -> Result<Self, Error> {
        self.metric(MetricKind::Sum, column, name, missing)
    }

    pub fn avg(
        self,
        column: &str,
        name: Option<&str>,
        missing: Option<f64>,
    ) -> Result<Self, Error> {
        self.metric(MetricKind::Avg, column, name, missing)
    }

    pub fn min(
        self,
        column: &str,
        name: Option<&str>,
        missing: Option<f64>,
    ) -> Result<Self, Error> {
        self.metric(MetricKind::Min, column, name, missing)
    }

    pub fn max(
        self,
        column: &str,
        name: Option<&str>,
        missing: Option<f64>,
    ) -> Result<Self, Error> {
        self.metric(MetricKind::Max, column, name, missing)
    }

    fn metric(
        mut self,
        kind: MetricKind,
        column: &str,
        name: Option<&str>,
        missing: Option<f64>,
    ) -> Result<Self, Error> {
        let (canonical, _) = self.resolve(column, false)?;
        let agg_name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_{}", kind.as_str(), column));
        self.aggs.insert(
            agg_name,
            AggNode::Metric {
                kind,
                target: MetricTarget::Field(canonical),
                missing,
            },
        );
        Ok(self)
    }

    /// Script-based metric in place of a field.
    pub fn metric_script(mut self, kind: MetricKind, script: Value, name: &str) -> Self {
        self.aggs.insert(
            name.to_string(),
            AggNode::Metric {
                kind,
                target: MetricTarget::Script(script),
                missing: None,
            },
        );
        self
    }

    // ==================== Sorting ====================

    /// Order by a resolved field. With an empty filter expression and an
    /// accumulated terms bucket, `_key`/`_count` attach to the bucket's own
    /// ordering instead of the document-level sort list. An analyzed text
    /// field declaring a keyword sub-field is substituted for sortability.
    pub fn order_by(mut self, column: &str, direction: Direction) -> Result<Self, Error> {
        if self.expr.is_empty() && self.bucket.is_some() && (column == "_key" || column == "_count")
        {
            if let Some(bucket) = self.bucket.as_mut() {
                bucket.order = Some((column.to_string(), direction));
            }
            return Ok(self);
        }
        let (canonical, meta) = self.resolve(column, false)?;
        let analyzed = meta.field_type == Some(FieldType::Text) || meta.index == Some(true);
        let field = match analyzed.then(|| meta.keyword_sub_field()).flatten() {
            Some(sub_field) => format!("{canonical}.{sub_field}"),
            None => canonical.clone(),
        };
        let nested_path = canonical.rsplit_once('.').map(|(path, _)| path.to_string());
        self.order.push_field(field, direction, nested_path);
        Ok(self)
    }

    /// Script-based sort; bypasses field resolution. A second script sort
    /// is rejected.
    pub fn order_by_script(mut self, script: Value, direction: Direction) -> Result<Self, Error> {
        self.order.push_script(script, direction)?;
        Ok(self)
    }

    // ==================== Paging and sources ====================

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// Pagination mode: derives offset and limit from the page number.
    pub fn page(mut self, page: u32, records_per_page: u32) -> Self {
        let page = page.max(1);
        self.page = page;
        self.records_per_page = Some(records_per_page);
        self.offset = (page - 1) * records_per_page;
        self.limit = records_per_page;
        self
    }

    pub fn min_score(mut self, min_score: f64) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// Restrict the source document to the given relations.
    pub fn with_sources(mut self, relations: &[&str]) -> Result<Self, Error> {
        for relation in relations {
            let canonical = self.source_relation(relation)?;
            self.source_include.push(canonical);
        }
        Ok(self)
    }

    /// Exclude the given relations from the source document. Inclusion
    /// takes precedence when both were set.
    pub fn without_sources(mut self, relations: &[&str]) -> Result<Self, Error> {
        for relation in relations {
            let canonical = self.source_relation(relation)?;
            self.source_exclude.push(canonical);
        }
        Ok(self)
    }

    fn source_relation(&self, relation: &str) -> Result<String, Error> {
        let last = relation.rsplit('.').next().unwrap_or(relation);
        if schema::is_canonical(last) {
            return Err(Error::InvalidField(format!(
                "'{relation}' is not a relationship path"
            )));
        }
        let (canonical, _) = self.resolve(relation, true)?;
        Ok(canonical)
    }

    // ==================== Assembly ====================

    /// The compiled boolean query tree, or `None` when it is empty.
    pub fn raw_query(&self) -> Option<Value> {
        self.expr.to_value()
    }

    /// Merge expression tree, sorts, aggregations, paging and source
    /// selection into one request document.
    pub fn build_request(&self) -> SearchRequest {
        let mut size = if self.limit > 0 { self.limit } else { DEFAULT_SIZE };
        let from = if self.page > 0 {
            (self.page - 1) * self.records_per_page.unwrap_or(0)
        } else {
            self.offset
        };
        let mut scroll = None;
        if let Some((ttl, batch_size)) = &self.scroll_window {
            size = *batch_size;
            scroll = Some(ttl.clone());
        }
        let aggs = (!self.aggs.is_empty()).then(|| self.aggs.to_value());
        let (query, size) = match self.expr.to_value() {
            Some(query) => (Some(query), size),
            None if aggs.is_some() => (None, 0),
            None => (Some(json!({ "match_all": {} })), size),
        };
        let source_exclude = if self.source_include.is_empty() {
            self.source_exclude.clone()
        } else {
            Vec::new()
        };
        SearchRequest {
            index: self.config.index_name.clone(),
            query,
            sort: self.order.to_values(),
            size,
            from,
            aggs,
            min_score: self.min_score,
            source_include: self.source_include.clone(),
            source_exclude,
            scroll,
        }
    }

    // ==================== Terminal calls ====================

    /// Execute the assembled request and hold the raw reply for projection.
    pub async fn get(mut self) -> Result<Self, Error> {
        let request = self.build_request();
        let start = Instant::now();
        let raw = self.client.search(&request).await?;
        histogram!("zetesis.search.duration_ms",
            "index" => self.config.index_name.clone()
        )
        .record(start.elapsed().as_millis() as f64);
        self.raw_results = Some(raw);
        Ok(self)
    }

    /// Total matching documents, executing the query first when needed.
    pub async fn count(self) -> Result<u64, Error> {
        if self.raw_results.is_some() {
            return self.total();
        }
        let executed = self.get().await?;
        executed.total()
    }

    /// First matching row, if any.
    pub async fn first(self) -> Result<Option<Row>, Error> {
        let executed = self.limit(1).get().await?;
        Ok(executed.rows().into_iter().next())
    }

    pub async fn first_record<F: RecordFactory>(
        self,
        factory: &F,
    ) -> Result<Option<F::Record>, Error> {
        match self.first().await? {
            Some(row) => factory.from_row(&row).map(Some),
            None => Ok(None),
        }
    }

    /// Look up one record by the configured key field.
    pub async fn find<F: RecordFactory>(
        self,
        key: impl ToLiteral,
        factory: &F,
    ) -> Result<Option<F::Record>, Error> {
        let key_name = self.config.key_name.clone();
        self.where_eq(&key_name, key)?.first_record(factory).await
    }

    /// Delete one document by key. A missing document is an expected
    /// condition, recovered to `false` rather than propagated.
    pub async fn delete(&self, key: &str) -> Result<bool, Error> {
        match self.client.delete(&self.config.index_name, key).await {
            Ok(()) => Ok(true),
            Err(Error::NotFound) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Drain the full result set through the backend's cursor, returning
    /// the flattened row list.
    pub async fn scroll_all(self, ttl: &str, batch_size: u32) -> Result<Vec<Row>, Error> {
        let batches = self.scroll_collect(ttl, batch_size).await?;
        Ok(batches.into_iter().flatten().collect())
    }

    /// Like `scroll_all`, but yields each batch as a serialized JSON
    /// string instead of flattening.
    pub async fn scroll_batches(self, ttl: &str, batch_size: u32) -> Result<Vec<String>, Error> {
        let batches = self.scroll_collect(ttl, batch_size).await?;
        batches
            .iter()
            .map(|batch| {
                serde_json::to_string(batch).map_err(|err| Error::Backend(err.to_string()))
            })
            .collect()
    }

    async fn scroll_collect(mut self, ttl: &str, batch_size: u32) -> Result<Vec<Vec<Row>>, Error> {
        self.scroll_window = Some((ttl.to_string(), batch_size));
        let start = Instant::now();
        let mut executed = self.get().await?;
        let client = Arc::clone(&executed.client);
        let mut batches = vec![executed.rows()];
        let mut cursor = executed.raw()?["_scroll_id"].as_str().map(str::to_string);
        while let Some(id) = cursor {
            let reply = client.scroll(&id, ttl).await?;
            let hits = reply["hits"]["hits"].as_array().map_or(0, |h| h.len());
            if hits == 0 {
                break;
            }
            cursor = reply["_scroll_id"].as_str().map(str::to_string);
            executed.raw_results = Some(reply);
            batches.push(executed.rows());
        }
        histogram!("zetesis.scroll.duration_ms",
            "index" => executed.config.index_name.clone()
        )
        .record(start.elapsed().as_millis() as f64);
        Ok(batches)
    }

    // ==================== Result view ====================

    fn raw(&self) -> Result<&Value, Error> {
        self.raw_results.as_ref().ok_or(Error::PrematureAccess)
    }

    pub fn raw_results(&self) -> Option<&Value> {
        self.raw_results.as_ref()
    }

    /// Total matching documents. Accepts both the object form
    /// (`{"value": n}`) and the bare-integer form of `hits.total`.
    pub fn total(&self) -> Result<u64, Error> {
        let raw = self.raw()?;
        total_value(&raw["hits"]["total"])
            .ok_or_else(|| Error::Backend("malformed 'hits.total' in reply".to_string()))
    }

    /// Project each hit's source document (under the index root key) plus
    /// its relevance score. Empty on a malformed reply or zero total.
    pub fn rows(&self) -> Vec<Row> {
        let Some(raw) = self.raw_results.as_ref() else {
            return Vec::new();
        };
        if total_value(&raw["hits"]["total"]).unwrap_or(0) == 0 {
            return Vec::new();
        }
        let Some(hits) = raw["hits"]["hits"].as_array() else {
            return Vec::new();
        };
        hits.iter()
            .filter_map(|hit| self.project_row(hit))
            .collect()
    }

    fn project_row(&self, hit: &Value) -> Option<Row> {
        let source = hit
            .get("_source")?
            .get(&self.config.index_name)?
            .as_object()?;
        let mut row = source.clone();
        row.insert(
            "_score".to_string(),
            hit.get("_score").cloned().unwrap_or(Value::Null),
        );
        Some(row)
    }

    /// Hydrate every row through the record factory.
    pub fn records<F: RecordFactory>(&self, factory: &F) -> Result<Vec<F::Record>, Error> {
        self.rows().iter().map(|row| factory.from_row(row)).collect()
    }

    pub fn aggregations(&self) -> Option<&Value> {
        self.raw_results.as_ref()?.get("aggregations")
    }

    pub fn aggregation(&self, name: &str) -> Option<&Value> {
        self.aggregations()?.get(name)
    }

    /// Descend through the reply's aggregation wrappers until a `buckets`
    /// key is found.
    pub fn aggregation_buckets(&self, name: &str) -> Option<&Value> {
        if name.is_empty() {
            return None;
        }
        descend_to_buckets(self.aggregation(name)?)
    }

    /// Sliding page-number window centered on the active page, clamped to
    /// the total page count.
    pub fn pagination(&self, records_per_page: Option<u32>) -> Result<Pagination, Error> {
        self.raw()?;
        let per_page = records_per_page.or(self.records_per_page).ok_or_else(|| {
            Error::Configuration("records per page required".to_string())
        })?;
        if per_page == 0 {
            return Err(Error::Configuration(
                "records per page required".to_string(),
            ));
        }
        let rows = self.total()?;
        let mut info = Pagination {
            pages: Vec::new(),
            rows: 0,
            active: 0,
            total_pages: 0,
            has_prev: false,
            has_next: false,
            per_page,
        };
        if rows == 0 {
            return Ok(info);
        }
        let total_pages = rows.div_ceil(per_page as u64);
        let page = (self.page.max(1) as u64).min(total_pages);
        let half = PAGINATION_WINDOW / 2;
        let (left, right) = if page <= half {
            (1, total_pages.min(PAGINATION_WINDOW))
        } else if page + half > total_pages {
            (
                total_pages.saturating_sub(PAGINATION_WINDOW - 1).max(1),
                total_pages,
            )
        } else {
            (page - half, page + half)
        };
        info.pages = (left..=right).collect();
        info.rows = rows;
        info.active = page;
        info.total_pages = total_pages;
        info.has_prev = page > left;
        info.has_next = page < right;
        Ok(info)
    }
}

fn term_or_terms(field: String, value: Literal) -> Clause {
    match value {
        Literal::Array(values) => Clause::Terms { field, values },
        value => Clause::Term { field, value },
    }
}

fn total_value(total: &Value) -> Option<u64> {
    match total {
        Value::Number(n) => n.as_u64(),
        Value::Object(obj) => obj.get("value").and_then(Value::as_u64),
        _ => None,
    }
}

fn descend_to_buckets(agg: &Value) -> Option<&Value> {
    let obj = agg.as_object()?;
    if let Some(buckets) = obj.get("buckets") {
        return Some(buckets);
    }
    if obj.len() == 2 {
        let (_, second) = obj.iter().nth(1)?;
        return descend_to_buckets(second);
    }
    None
}

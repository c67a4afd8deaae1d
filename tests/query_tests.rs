mod common;

use common::{BareProvider, INDEX, ListingProvider, StubClient, stub_builder};
use serde_json::json;
use std::sync::Arc;
use zetesis::{
    Direction, Error, Literal, Operator, QueryBuilder, SchemaProvider, SearchClient, SearchConfig,
    Validation,
};

fn bare_builder() -> QueryBuilder {
    let client: Arc<dyn SearchClient> = Arc::new(StubClient::new());
    QueryBuilder::new(client, &BareProvider)
}

#[test]
fn where_eq_compiles_to_filter_term() {
    let (_, qb) = stub_builder();
    let qb = qb.where_eq("status", "active").unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": { "filter": [{ "term": { "status": "active" } }] } })
    );
}

#[test]
fn two_argument_form_matches_explicit_operator() {
    let (_, qb) = stub_builder();
    let shorthand = qb.where_eq("price", 42).unwrap().raw_query();
    let (_, qb) = stub_builder();
    let explicit = qb.where_op("price", Operator::Eq, 42).unwrap().raw_query();
    assert_eq!(shorthand, explicit);
}

#[test]
fn null_equality_negates_existence() {
    let (_, qb) = stub_builder();
    let qb = qb.where_null("description").unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": { "filter": [
            { "bool": { "must_not": [{ "exists": { "field": "description" } }] } }
        ] } })
    );
}

#[test]
fn negation_has_four_shapes() {
    let (_, qb) = stub_builder();
    let qb = qb.where_ne("status", "sold").unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": { "must_not": [{ "term": { "status": "sold" } }] } })
    );

    let (_, qb) = stub_builder();
    let qb = qb.where_not_null("status").unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": { "filter": [{ "exists": { "field": "status" } }] } })
    );

    let (_, qb) = stub_builder();
    let qb = qb.or_ne("status", "sold").unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": {
            "should": [{ "bool": { "must_not": [{ "term": { "status": "sold" } }] } }],
            "minimum_should_match": 1
        } })
    );

    let (_, qb) = stub_builder();
    let qb = qb.or_ne("status", Literal::Null).unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": {
            "should": [{ "exists": { "field": "status" } }],
            "minimum_should_match": 1
        } })
    );
}

#[test]
fn negation_over_array_uses_terms() {
    let (_, qb) = stub_builder();
    let qb = qb.where_ne("price", vec![1, 2, 3]).unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": { "must_not": [{ "terms": { "price": [1, 2, 3] } }] } })
    );
}

#[test]
fn or_clause_sets_quorum() {
    let (_, qb) = stub_builder();
    let qb = qb
        .where_eq("status", "active")
        .unwrap()
        .or_eq("status", "pending")
        .unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": {
            "should": [{ "term": { "status": "pending" } }],
            "filter": [{ "term": { "status": "active" } }],
            "minimum_should_match": 1
        } })
    );
}

#[test]
fn range_operators_use_backend_keys() {
    let (_, qb) = stub_builder();
    let qb = qb
        .where_op("price", Operator::Gte, 10)
        .unwrap()
        .where_op("price", Operator::Lt, 100)
        .unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": { "filter": [
            { "range": { "price": { "gte": 10 } } },
            { "range": { "price": { "lt": 100 } } }
        ] } })
    );
}

#[test]
fn like_is_scored_even_under_and() {
    let (_, qb) = stub_builder();
    let qb = qb.where_like("description", "garden view").unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": { "must": [{ "match": { "description": "garden view" } }] } })
    );
}

#[test]
fn wildcard_compiles_to_wildcard_clause() {
    let (_, qb) = stub_builder();
    let qb = qb
        .where_wildcard("status", "act*")
        .unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": { "filter": [{ "wildcard": { "status": "act*" } }] } })
    );
}

#[test]
fn empty_value_set_fails_closed() {
    let (_, qb) = stub_builder();
    let qb = qb.where_in::<i32>("status", &[]).unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": { "filter": [{ "term": { "id": -9999 } }] } })
    );

    let (_, qb) = stub_builder();
    let qb = qb.where_not_in::<i32>("status", &[]).unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": { "filter": [{ "term": { "id": -9999 } }] } })
    );
}

#[test]
fn where_in_compiles_to_terms() {
    let (_, qb) = stub_builder();
    let qb = qb.where_in("status", &["active", "pending"]).unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": { "filter": [
            { "terms": { "status": ["active", "pending"] } }
        ] } })
    );
}

#[test]
fn where_not_in_lands_in_must_not() {
    let (_, qb) = stub_builder();
    let qb = qb.where_not_in("price", &[1, 2]).unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": { "must_not": [{ "terms": { "price": [1, 2] } }] } })
    );
}

#[test]
fn between_requires_a_bound() {
    let (_, qb) = stub_builder();
    let err = qb
        .where_between("price", Literal::Null, Literal::Null)
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    let (_, qb) = stub_builder();
    let qb = qb.where_between("price", 10, Literal::Null).unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": { "filter": [{ "range": { "price": { "gte": 10 } } }] } })
    );
}

#[test]
fn or_between_groups_both_bounds() {
    let (_, qb) = stub_builder();
    let qb = qb
        .where_eq("status", "active")
        .unwrap()
        .or_between("price", 10, 20)
        .unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": {
            "should": [{ "bool": { "filter": [
                { "range": { "price": { "gte": 10 } } },
                { "range": { "price": { "lte": 20 } } }
            ] } }],
            "filter": [{ "term": { "status": "active" } }],
            "minimum_should_match": 1
        } })
    );
}

#[test]
fn strict_mode_rejects_range_on_text() {
    let (_, qb) = stub_builder();
    let err = qb.where_op("title", Operator::Lt, "zzz").unwrap_err();
    assert!(matches!(err, Error::InvalidOperator(_)));
}

#[test]
fn strict_mode_validates_integer_values() {
    let (_, qb) = stub_builder();
    let err = qb.where_eq("price", "cheap").unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    // A digit string is integer-like, mirroring lenient callers.
    let (_, qb) = stub_builder();
    assert!(qb.where_eq("price", "123").is_ok());
}

#[test]
fn strict_mode_validates_date_values() {
    let (_, qb) = stub_builder();
    let err = qb.where_eq("listed_at", "soon").unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let (_, qb) = stub_builder();
    assert!(qb.where_eq("listed_at", "2024-03-01").is_ok());
}

#[test]
fn unknown_fields_are_rejected() {
    let (_, qb) = stub_builder();
    assert!(matches!(
        qb.where_eq("colour", 1),
        Err(Error::InvalidField(_))
    ));
}

#[test]
fn column_existence_only_skips_value_checks() {
    let client: Arc<dyn SearchClient> = Arc::new(StubClient::new());
    let qb = QueryBuilder::with_config(
        client,
        ListingProvider.field_map(),
        SearchConfig {
            index_name: INDEX.to_string(),
            key_name: "id".to_string(),
            validation: Validation::ColumnExistenceOnly,
        },
    );
    // Value/type agreement is not enforced, field existence still is.
    let qb = qb.where_eq("price", "cheap").unwrap();
    assert!(matches!(
        qb.where_eq("colour", 1),
        Err(Error::InvalidField(_))
    ));
}

#[test]
fn operators_parse_from_surface_tokens() {
    assert_eq!("<=".parse::<Operator>().unwrap(), Operator::Lte);
    assert_eq!("LIKE".parse::<Operator>().unwrap(), Operator::Like);
    assert_eq!("*".parse::<Operator>().unwrap(), Operator::Wildcard);
    assert!(matches!(
        "~".parse::<Operator>(),
        Err(Error::InvalidOperator(_))
    ));
}

#[test]
fn bare_schema_normalizes_names_only() {
    let qb = bare_builder();
    let qb = qb.where_eq("listedAt", "whenever").unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": { "filter": [{ "term": { "listed_at": "whenever" } }] } })
    );
}

#[test]
fn where_group_merges_as_single_must_entry() {
    let (_, qb) = stub_builder();
    let qb = qb
        .where_group(|q| q.where_eq("status", "a")?.or_eq("status", "b"))
        .unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": { "must": [{ "bool": {
            "should": [{ "term": { "status": "b" } }],
            "filter": [{ "term": { "status": "a" } }],
            "minimum_should_match": 1
        } }] } })
    );
}

#[test]
fn or_group_merges_as_should_with_quorum() {
    let (_, qb) = stub_builder();
    let qb = qb
        .where_eq("status", "active")
        .unwrap()
        .or_group(|q| q.where_eq("price", 1)?.where_eq("status", "b"))
        .unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": {
            "should": [{ "bool": { "filter": [
                { "term": { "price": 1 } },
                { "term": { "status": "b" } }
            ] } }],
            "filter": [{ "term": { "status": "active" } }],
            "minimum_should_match": 1
        } })
    );
}

#[test]
fn where_has_wraps_nested_path() {
    let (_, qb) = stub_builder();
    let qb = qb
        .where_has("Orders", |q| q.where_op("amount", Operator::Gte, 100))
        .unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": { "filter": [{ "nested": {
            "path": "orders",
            "query": { "bool": { "filter": [
                { "range": { "orders.amount": { "gte": 100 } } }
            ] } }
        } }] } })
    );
}

#[test]
fn where_has_composes_through_deep_relationships() {
    let (_, qb) = stub_builder();
    let qb = qb
        .where_has("Orders.Customer", |q| q.where_like("name", "smith"))
        .unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": { "filter": [{ "nested": {
            "path": "orders",
            "query": { "nested": {
                "path": "orders.customer",
                "query": { "bool": { "must": [
                    { "match": { "orders.customer.name": "smith" } }
                ] } }
            } }
        } }] } })
    );
}

#[test]
fn boosted_where_has_uses_constant_score() {
    let (_, qb) = stub_builder();
    let qb = qb
        .where_has_boosted("Orders", |q| q.where_eq("status", "paid"), 2.0)
        .unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": { "filter": [{ "constant_score": {
            "filter": { "nested": {
                "path": "orders",
                "query": { "bool": { "filter": [
                    { "term": { "orders.status": "paid" } }
                ] } }
            } },
            "boost": 2.0
        } }] } })
    );
}

#[test]
fn where_has_null_negates_nested_existence() {
    let (_, qb) = stub_builder();
    let qb = qb.where_has_null("Orders").unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": { "filter": [{ "bool": { "must_not": [{ "nested": {
            "path": "orders",
            "query": { "exists": { "field": "orders" } }
        } }] } }] } })
    );
}

#[test]
fn where_has_null_matching_negates_the_sub_query() {
    let (_, qb) = stub_builder();
    let qb = qb
        .where_has_null_matching("Orders", |q| q.where_eq("status", "open"))
        .unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": { "filter": [{ "bool": { "must_not": [{ "nested": {
            "path": "orders",
            "query": { "bool": { "filter": [
                { "term": { "orders.status": "open" } }
            ] } }
        } }] } }] } })
    );
}

#[test]
fn where_match_lands_in_must() {
    let (_, qb) = stub_builder();
    let qb = qb.where_match("title", "loft").unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": { "must": [{ "match": { "title": "loft" } }] } })
    );
}

#[test]
fn where_match_with_merges_options() {
    let (_, qb) = stub_builder();
    let options = json!({ "operator": "and" });
    let qb = qb
        .where_match_with(
            "title",
            Some(Literal::String("city loft".to_string())),
            options.as_object().unwrap().clone(),
        )
        .unwrap();
    assert_eq!(
        qb.raw_query().unwrap(),
        json!({ "bool": { "must": [{ "match": { "title": {
            "operator": "and",
            "query": "city loft"
        } } }] } })
    );
}

#[test]
fn where_match_with_requires_a_query() {
    let (_, qb) = stub_builder();
    let options = json!({ "operator": "and" });
    let err = qb
        .where_match_with("title", None, options.as_object().unwrap().clone())
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn order_by_prefers_keyword_sub_field() {
    let (_, qb) = stub_builder();
    let qb = qb.order_by("title", Direction::Desc).unwrap();
    let request = qb.build_request();
    assert_eq!(request.sort, vec![json!({ "title.raw": { "order": "desc" } })]);
}

#[test]
fn order_by_relationship_attaches_nested_path() {
    let (_, qb) = stub_builder();
    let qb = qb.order_by("Orders.amount", Direction::Asc).unwrap();
    let request = qb.build_request();
    assert_eq!(
        request.sort,
        vec![json!({ "orders.amount": { "order": "asc", "nested_path": "orders" } })]
    );
}

#[test]
fn second_script_sort_is_a_caller_error() {
    let (_, qb) = stub_builder();
    let qb = qb
        .order_by_script(json!({ "source": "doc['price'].value" }), Direction::Asc)
        .unwrap();
    let err = qb
        .order_by_script(json!({ "source": "doc['id'].value" }), Direction::Desc)
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn script_sort_is_stored_under_reserved_name() {
    let (_, qb) = stub_builder();
    let qb = qb
        .order_by_script(json!({ "source": "doc['price'].value" }), Direction::Desc)
        .unwrap();
    let request = qb.build_request();
    assert_eq!(
        request.sort,
        vec![json!({ "_script": {
            "type": "number",
            "script": { "source": "doc['price'].value" },
            "order": "desc"
        } })]
    );
}

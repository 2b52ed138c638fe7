//! Integration tests for the core crate.

use adacta_core::api::{InboxResponse, SearchResponse, TagBucket};
use adacta_core::query::{Clause, DateRange, FilterFacets};
use chrono::NaiveDate;
use serde_json::json;

#[test]
fn test_empty_facets_have_no_clauses() {
    let query = FilterFacets::new().combined_query();
    assert!(query.clauses().is_empty());

    let serialized = serde_json::to_value(&query).unwrap();
    assert_eq!(
        serialized,
        json!({
            "query": { "bool": { "must": [] } },
            "aggregations": { "tags": { "terms": { "field": "tags", "min_doc_count": 1 } } }
        })
    );
}

#[test]
fn test_each_tag_is_a_required_term() {
    let mut facets = FilterFacets::new();
    facets.add_tag("t1");
    facets.add_tag("t2");

    let query = facets.combined_query();
    assert_eq!(query.clauses().len(), 2);

    let serialized = serde_json::to_value(&query).unwrap();
    assert_eq!(
        serialized["query"]["bool"]["must"],
        json!([{ "term": { "tags": "t1" } }, { "term": { "tags": "t2" } }])
    );
}

#[test]
fn test_text_clause_uses_and_operator() {
    let mut facets = FilterFacets::new();
    facets.set_text("electricity bill");

    let serialized = serde_json::to_value(facets.combined_query()).unwrap();
    assert_eq!(
        serialized["query"]["bool"]["must"],
        json!([{
            "query_string": {
                "query": "electricity bill",
                "default_field": "text",
                "default_operator": "AND"
            }
        }])
    );
}

#[test]
fn test_half_open_range_omits_missing_bound() {
    let mut facets = FilterFacets::new();
    facets.set_uploaded(DateRange::new(NaiveDate::from_ymd_opt(2024, 1, 1), None));

    let serialized = serde_json::to_value(facets.combined_query()).unwrap();
    assert_eq!(
        serialized["query"]["bool"]["must"],
        json!([{ "range": { "uploaded": { "gte": "2024-01-01" } } }])
    );
}

#[test]
fn test_clause_order_is_tags_text_range() {
    let mut facets = FilterFacets::new();
    facets.set_uploaded(DateRange::new(None, NaiveDate::from_ymd_opt(2023, 12, 31)));
    facets.set_text("receipt");
    facets.add_tag("home");

    let query = facets.combined_query();
    assert!(matches!(query.clauses()[0], Clause::Term(_)));
    assert!(matches!(query.clauses()[1], Clause::QueryString(_)));
    assert!(matches!(query.clauses()[2], Clause::Range(_)));
}

#[test]
fn test_combined_query_is_idempotent() {
    let mut facets = FilterFacets::new();
    facets.add_tag("insurance");
    facets.set_text("car");

    assert_eq!(facets.combined_query(), facets.combined_query());
}

#[test]
fn test_search_response_deserialize() {
    let raw = json!({
        "hits": { "hits": [{ "_id": "d1" }, { "_id": "d2" }] },
        "aggregations": { "tags": { "buckets": [{ "key": "tax", "doc_count": 2 }] } }
    });

    let response: SearchResponse = serde_json::from_value(raw).unwrap();
    let ids: Vec<_> = response.hits.hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, ["d1", "d2"]);
    assert_eq!(
        response.aggregations.tags.buckets,
        vec![TagBucket {
            key: "tax".into(),
            doc_count: 2
        }]
    );
}

#[test]
fn test_search_response_without_aggregations() {
    let response: SearchResponse =
        serde_json::from_value(json!({ "hits": { "hits": [] } })).unwrap();
    assert!(response.aggregations.tags.buckets.is_empty());
}

#[test]
fn test_inbox_response_serde() {
    let inbox: InboxResponse =
        serde_json::from_str(r#"{"count":12,"docs":["a","b"]}"#).unwrap();
    assert_eq!(inbox.count, 12);
    assert_eq!(inbox.docs, vec!["a".to_string(), "b".to_string()]);
}

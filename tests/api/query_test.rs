//! Query compilation and hydration through the model layer.

use phonecom_sdk::models::{Listener, Sms};
use phonecom_sdk::query::{Grammar, MasonGrammar};
use phonecom_sdk::transport::{MockResponse, Verb};
use phonecom_sdk::Operator;
use serde_json::json;

use crate::common::{registry, Ticket};

#[test]
fn test_url_templates_substitute_known_params_only() {
    let grammar = MasonGrammar;

    let params = [("id".to_string(), json!(42))].into_iter().collect();
    assert_eq!(grammar.compile_url("/listeners/{id}", &params), "/listeners/42");
    assert_eq!(grammar.compile_url("/events/{id:[0-9]+}", &params), "/events/42");
    assert_eq!(grammar.compile_url("/x/{id}", &Default::default()), "/x/{id}");
}

#[test]
fn test_filters_compile_to_operator_prefixed_values() {
    let (registry, _) = registry(vec![]);

    let (url, options) = registry
        .query::<Sms>()
        .where_op("status", "eq", "active")
        .unwrap()
        .where_between("age", 18, 65)
        .unwrap()
        .where_empty("name")
        .compile();

    assert_eq!(url, "/sms");
    assert_eq!(options.query_value("filter[status]"), Some("eq:active"));
    assert_eq!(options.query_value("filter[age]"), Some("between:18,65"));
    assert_eq!(options.query_value("filter[name]"), Some("empty"));
}

#[test]
fn test_repeated_column_uses_list_filters() {
    let (registry, _) = registry(vec![]);

    let (_, options) = registry
        .query::<Sms>()
        .filter("created", Operator::Gte, 100)
        .unwrap()
        .filter("created", Operator::Lt, 200)
        .unwrap()
        .compile();

    let values: Vec<&str> = options
        .query
        .iter()
        .filter(|(key, _)| key == "filter[created][]")
        .map(|(_, value)| value.as_str())
        .collect();
    assert_eq!(values, vec!["gte:100", "lt:200"]);
}

#[test]
fn test_unknown_operator_is_rejected() {
    let (registry, _) = registry(vec![]);
    assert!(registry.query::<Sms>().where_op("status", "like", "x").is_err());
}

#[tokio::test]
async fn test_filtered_sorted_limited_get_hydrates_in_order() {
    let (registry, handle) = registry(vec![MockResponse::ok(json!({
        "items": [
            {"id": 1, "status": "open", "@controls": {"self": {"href": "/listeners/1"}}},
            {"id": 2, "status": "open", "@controls": {"self": {"href": "/listeners/2"}}}
        ],
        "total": 2
    }))]);

    let listeners = registry
        .query::<Listener>()
        .without_global_scopes()
        .where_op("status", "eq", "open")
        .unwrap()
        .order_by("created", "desc")
        .limit(10)
        .get()
        .await
        .unwrap();

    assert_eq!(listeners.len(), 2);
    assert_eq!(listeners[0].key(), Some(&json!(1)));
    assert_eq!(listeners[1].key(), Some(&json!(2)));
    assert!(listeners.iter().all(|listener| listener.exists()));
    assert_eq!(listeners[1].self_url(), Some("/listeners/2"));

    let history = handle.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].verb, Verb::Get);
    assert_eq!(history[0].url, "/listeners");
    let options = &history[0].options;
    assert_eq!(options.query_value("filter[status]"), Some("eq:open"));
    assert_eq!(options.query_value("sort[created]"), Some("desc"));
    assert_eq!(options.query_value("limit"), Some("10"));
}

#[tokio::test]
async fn test_path_params_reach_the_request_and_the_models() {
    let (registry, handle) = registry(vec![MockResponse::collection(vec![json!({"id": 5})])]);

    let tickets = registry
        .query::<Ticket>()
        .with_path_param("account", 1234)
        .get()
        .await
        .unwrap();

    assert_eq!(handle.history()[0].url, "/accounts/1234/tickets");
    assert_eq!(tickets[0].path_params().get("account"), Some(&json!(1234)));
}

#[tokio::test]
async fn test_find_of_missing_record_is_none() {
    let (registry, handle) = registry(vec![MockResponse::mason(404, json!({}))]);

    let found = registry.find::<Sms>(99).await.unwrap();

    assert!(found.is_none());
    assert_eq!(handle.history()[0].options.query_value("filter[id]"), Some("eq:99"));
}

#[tokio::test]
async fn test_count_reads_total_with_a_single_row_page() {
    let (registry, handle) = registry(vec![MockResponse::ok(json!({"items": [{"id": 1}], "total": 37}))]);

    assert_eq!(registry.query::<Sms>().count().await.unwrap(), 37);
    assert_eq!(handle.history()[0].options.query_value("limit"), Some("1"));
}

#[tokio::test]
async fn test_find_many_with_no_ids_sends_nothing() {
    let (registry, handle) = registry(vec![]);

    let found = registry.query::<Sms>().find_many(vec![]).await.unwrap();

    assert!(found.is_empty());
    assert!(handle.history().is_empty());
}

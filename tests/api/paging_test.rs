//! Chunked paging and bulk mutation.

use phonecom_sdk::models::Application;
use phonecom_sdk::transport::{MockResponse, Verb};
use phonecom_sdk::{Error, Model};
use serde_json::json;

use crate::common::{attrs, page, registry, row_with_self, rows};

fn page_params(handle: &phonecom_sdk::transport::MockHandle) -> Vec<(String, String)> {
    handle
        .history()
        .iter()
        .map(|request| {
            (
                request.options.query_value("offset").unwrap_or_default().to_string(),
                request.options.query_value("limit").unwrap_or_default().to_string(),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_chunk_of_a_short_result_fetches_one_page() {
    let (registry, handle) = registry(vec![page(rows(1, 30), 30)]);
    let mut seen = 0;

    registry
        .query::<Application>()
        .chunk(50, |models: Vec<Model>| {
            seen += models.len();
            async { Ok::<_, Error>(true) }
        })
        .await
        .unwrap();

    assert_eq!(seen, 30);
    assert_eq!(page_params(&handle), vec![("0".to_string(), "50".to_string())]);
}

#[tokio::test]
async fn test_chunk_walks_pages_with_offset_and_limit() {
    let (registry, handle) = registry(vec![
        page(rows(1, 50), 150),
        page(rows(51, 50), 150),
        page(rows(101, 50), 150),
    ]);
    let mut first_ids = Vec::new();

    registry
        .query::<Application>()
        .chunk(50, |models: Vec<Model>| {
            first_ids.push(models[0].key().cloned());
            async { Ok::<_, Error>(true) }
        })
        .await
        .unwrap();

    assert_eq!(first_ids, vec![Some(json!(1)), Some(json!(51)), Some(json!(101))]);
    assert_eq!(
        page_params(&handle),
        vec![
            ("0".to_string(), "50".to_string()),
            ("50".to_string(), "50".to_string()),
            ("100".to_string(), "50".to_string()),
        ]
    );
    assert_eq!(handle.remaining(), 0);
}

#[tokio::test]
async fn test_chunk_stops_when_callback_declines() {
    let (registry, handle) = registry(vec![page(rows(1, 10), 100), page(rows(11, 10), 100)]);

    registry
        .query::<Application>()
        .chunk(10, |_| async { Ok::<_, Error>(false) })
        .await
        .unwrap();

    assert_eq!(handle.history().len(), 1);
}

#[tokio::test]
async fn test_chunk_size_must_be_positive() {
    let (registry, _) = registry(vec![]);
    let err = registry
        .query::<Application>()
        .chunk(0, |_| async { Ok::<_, Error>(true) })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
async fn test_bulk_update_rewrites_each_match_through_its_self_link() {
    let (registry, handle) = registry(vec![
        page(
            vec![
                row_with_self(1, "/applications/1", attrs(json!({"status": "open"}))),
                row_with_self(2, "/applications/2", attrs(json!({"status": "open"}))),
            ],
            2,
        ),
        MockResponse::ok(json!({})),
        MockResponse::ok(json!({})),
    ]);

    let updated = registry
        .query::<Application>()
        .where_eq("status", "open")
        .unwrap()
        .update(attrs(json!({"status": "closed"})))
        .await
        .unwrap();

    assert_eq!(updated, 2);
    let history = handle.history();
    assert_eq!(history[1].verb, Verb::Put);
    assert_eq!(history[1].url, "/applications/1");
    assert_eq!(history[1].options.json, Some(json!({"id": 1, "status": "closed"})));
    assert_eq!(history[2].url, "/applications/2");
}

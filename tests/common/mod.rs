//! Shared utilities for integration tests.
//!
//! Builds a registry over a scripted transport with the bundled models plus a
//! plain incrementing resource.

#![allow(dead_code)]

use phonecom_sdk::eloquent::{ModelSchema, Registry, Resource};
use phonecom_sdk::models;
use phonecom_sdk::transport::{MockHandle, MockResponse};
use phonecom_sdk::Client;
use serde_json::{json, Map, Value};

/// A support ticket nested under an account. Created one at a time and
/// answered with the created document.
pub struct Ticket;

impl Resource for Ticket {
    const NAME: &'static str = "Ticket";

    fn schema() -> ModelSchema {
        ModelSchema::new(Self::NAME, "/accounts/{account}/tickets")
            .guarded(["internal_notes"])
            .dates(["created"])
    }
}

/// Registry with every bundled model and [`Ticket`], answering from `responses`.
pub fn registry(responses: Vec<MockResponse>) -> (Registry, MockHandle) {
    let (client, handle) = Client::mock(responses);
    let registry = models::register(Registry::builder(client))
        .resource::<Ticket>()
        .boot()
        .expect("bundled models boot");
    (registry, handle)
}

/// A row with a Mason self link.
pub fn row_with_self(id: i64, href: &str, mut fields: Map<String, Value>) -> Value {
    fields.insert("id".to_string(), json!(id));
    fields.insert("@controls".to_string(), json!({"self": {"href": href}}));
    Value::Object(fields)
}

/// Build an attribute map from a `json!` object literal.
pub fn attrs(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// `count` rows with ids starting at `first`.
pub fn rows(first: i64, count: usize) -> Vec<Value> {
    (0..count as i64)
        .map(|i| json!({"id": first + i, "status": "open"}))
        .collect()
}

/// A collection page reporting `total` rows overall.
pub fn page(items: Vec<Value>, total: u64) -> MockResponse {
    MockResponse::ok(json!({"items": items, "total": total}))
}

//! Query and paging step definitions.

use cucumber::{given, then, when, World};
use phonecom_sdk::eloquent::Registry;
use phonecom_sdk::models::{self, Application};
use phonecom_sdk::transport::{HttpRequest, MockHandle, MockResponse, Verb};
use phonecom_sdk::{Client, Error, Model};
use serde_json::json;

/// Test context for query scenarios.
#[derive(World)]
#[world(init = Self::new)]
pub struct QueryWorld {
    registry: Option<Registry>,
    handle: Option<MockHandle>,
    models: Vec<Model>,
    found: Option<Model>,
    processed: usize,
}

impl std::fmt::Debug for QueryWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryWorld")
            .field("models", &self.models.len())
            .field("processed", &self.processed)
            .finish()
    }
}

impl QueryWorld {
    fn new() -> Self {
        Self {
            registry: None,
            handle: None,
            models: Vec::new(),
            found: None,
            processed: 0,
        }
    }

    fn registry(&self) -> &Registry {
        self.registry.as_ref().expect("registry not booted")
    }

    fn handle(&self) -> &MockHandle {
        self.handle.as_ref().expect("registry not booted")
    }

    fn last_request(&self) -> HttpRequest {
        self.handle()
            .history()
            .pop()
            .expect("no request was sent")
    }
}

// --- Background ---

#[given("a registry of the bundled resources")]
async fn given_registry(world: &mut QueryWorld) {
    let (client, handle) = Client::mock(Vec::new());
    let registry = models::register(Registry::builder(client))
        .boot()
        .expect("bundled models boot");
    world.registry = Some(registry);
    world.handle = Some(handle);
}

// --- Given steps ---

#[given(expr = "the API lists applications {int} and {int} out of {int}")]
async fn given_two_applications(world: &mut QueryWorld, first: i64, second: i64, total: u64) {
    world.handle().push(MockResponse::ok(json!({
        "items": [
            {"id": first, "status": "open", "@controls": {"self": {"href": format!("/applications/{first}")}}},
            {"id": second, "status": "open", "@controls": {"self": {"href": format!("/applications/{second}")}}}
        ],
        "total": total
    })));
}

#[given("the API answers not found")]
async fn given_not_found(world: &mut QueryWorld) {
    world.handle().push(MockResponse::mason(404, json!({})));
}

#[given(expr = "the API holds {int} applications")]
async fn given_applications(world: &mut QueryWorld, total: u64) {
    let mut id = 1u64;
    while id <= total {
        let items: Vec<_> = (id..=total.min(id + 49))
            .map(|n| json!({"id": n, "status": "open"}))
            .collect();
        id += items.len() as u64;
        world
            .handle()
            .push(MockResponse::ok(json!({"items": items, "total": total})));
    }
}

// --- When steps ---

#[when(expr = "I list applications where {string} is {string} newest first, at most {int}")]
async fn when_list_filtered(world: &mut QueryWorld, column: String, value: String, limit: i64) {
    world.models = world
        .registry()
        .query::<Application>()
        .where_eq(column, value)
        .expect("valid clause")
        .order_by("created", "desc")
        .limit(limit)
        .get()
        .await
        .expect("listing succeeds");
}

#[when(expr = "I find application {int}")]
async fn when_find(world: &mut QueryWorld, id: i64) {
    world.found = world
        .registry()
        .find::<Application>(id)
        .await
        .expect("lookup succeeds");
}

#[when(expr = "I chunk applications by {int}")]
async fn when_chunk(world: &mut QueryWorld, size: u64) {
    let mut processed = 0;
    world
        .registry()
        .query::<Application>()
        .chunk(size, |models: Vec<Model>| {
            processed += models.len();
            async { Ok::<_, Error>(true) }
        })
        .await
        .expect("chunking succeeds");
    world.processed = processed;
}

// --- Then steps ---

#[then(expr = "I receive applications {int} and {int} in that order")]
async fn then_received_in_order(world: &mut QueryWorld, first: i64, second: i64) {
    let ids: Vec<_> = world.models.iter().map(|model| model.key().cloned()).collect();
    assert_eq!(ids, vec![Some(json!(first)), Some(json!(second))]);
}

#[then("every received application exists")]
async fn then_all_exist(world: &mut QueryWorld) {
    assert!(world.models.iter().all(Model::exists));
}

#[then(expr = "the request was a GET to {string}")]
async fn then_get_to(world: &mut QueryWorld, url: String) {
    let request = world.last_request();
    assert_eq!(request.verb, Verb::Get);
    assert_eq!(request.url, url);
}

#[then(expr = "the request sent {string} as {string}")]
async fn then_request_param(world: &mut QueryWorld, key: String, value: String) {
    let request = world.last_request();
    assert_eq!(request.options.query_value(&key), Some(value.as_str()));
}

#[then("nothing is found")]
async fn then_nothing_found(world: &mut QueryWorld) {
    assert!(world.found.is_none());
}

#[then(expr = "{int} page requests were sent")]
async fn then_page_requests(world: &mut QueryWorld, count: usize) {
    assert_eq!(world.handle().history().len(), count);
}

#[then(expr = "the page offsets were {string}")]
async fn then_page_offsets(world: &mut QueryWorld, offsets: String) {
    let sent: Vec<String> = world
        .handle()
        .history()
        .iter()
        .map(|request| request.options.query_value("offset").unwrap_or_default().to_string())
        .collect();
    assert_eq!(sent.join(","), offsets);
}

#[then(expr = "every page asked for {int} rows")]
async fn then_page_limits(world: &mut QueryWorld, limit: u64) {
    let limit = limit.to_string();
    assert!(world
        .handle()
        .history()
        .iter()
        .all(|request| request.options.query_value("limit") == Some(limit.as_str())));
}

#[then(expr = "{int} applications were processed")]
async fn then_processed(world: &mut QueryWorld, count: usize) {
    assert_eq!(world.processed, count);
}

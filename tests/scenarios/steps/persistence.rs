//! Creation and error classification step definitions.

use cucumber::gherkin::Step;
use cucumber::{given, then, when, World};
use phonecom_sdk::eloquent::Registry;
use phonecom_sdk::models::{self, Application};
use phonecom_sdk::transport::{MockHandle, MockResponse, Verb};
use phonecom_sdk::{Client, Error, Model};
use serde_json::{json, Map, Value};

/// Test context for persistence scenarios.
#[derive(World)]
#[world(init = Self::new)]
pub struct PersistenceWorld {
    registry: Option<Registry>,
    handle: Option<MockHandle>,
    created: Option<Model>,
    last_error: Option<Error>,
}

impl std::fmt::Debug for PersistenceWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceWorld")
            .field("created", &self.created.as_ref().map(Model::key))
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl PersistenceWorld {
    fn new() -> Self {
        Self {
            registry: None,
            handle: None,
            created: None,
            last_error: None,
        }
    }

    fn registry(&self) -> &Registry {
        self.registry.as_ref().expect("registry not booted")
    }

    fn handle(&self) -> &MockHandle {
        self.handle.as_ref().expect("registry not booted")
    }

    fn created(&self) -> &Model {
        self.created.as_ref().expect("nothing was created")
    }

    fn error(&self) -> &Error {
        self.last_error.as_ref().expect("the call did not fail")
    }
}

fn docstring_json(step: &Step) -> Value {
    let raw = step.docstring.as_deref().expect("step needs a docstring");
    serde_json::from_str(raw).expect("docstring is JSON")
}

fn docstring_attributes(step: &Step) -> Map<String, Value> {
    match docstring_json(step) {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

// --- Background ---

#[given("a registry of the bundled resources")]
async fn given_registry(world: &mut PersistenceWorld) {
    let (client, handle) = Client::mock(Vec::new());
    let registry = models::register(Registry::builder(client))
        .boot()
        .expect("bundled models boot");
    world.registry = Some(registry);
    world.handle = Some(handle);
}

// --- Given steps ---

#[given(expr = "the API assigns id {int} to the next created resource")]
async fn given_assigned_id(world: &mut PersistenceWorld, id: i64) {
    world.handle().push(MockResponse::ok(json!({"id": id})));
}

#[given(regex = r#"^the API answers status (\d+) as "([^"]*)" with '(.*)'$"#)]
async fn given_response(world: &mut PersistenceWorld, status: u16, content_type: String, body: String) {
    world.handle().push(MockResponse::raw(status, &content_type, body));
}

// --- When steps ---

#[when("I create an application with:")]
async fn when_create(world: &mut PersistenceWorld, step: &Step) {
    let attributes = docstring_attributes(step);
    match world.registry().create::<Application>(attributes).await {
        Ok(model) => world.created = Some(model),
        Err(err) => world.last_error = Some(err),
    }
}

#[when("I list applications")]
async fn when_list(world: &mut PersistenceWorld) {
    if let Err(err) = world.registry().all::<Application>().await {
        world.last_error = Some(err);
    }
}

// --- Then steps ---

#[then(expr = "exactly one POST was sent to {string}")]
async fn then_one_post(world: &mut PersistenceWorld, url: String) {
    let history = world.handle().history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].verb, Verb::Post);
    assert_eq!(history[0].url, url);
}

#[then("the request body was:")]
async fn then_request_body(world: &mut PersistenceWorld, step: &Step) {
    let history = world.handle().history();
    assert_eq!(history[0].options.json, Some(docstring_json(step)));
}

#[then(expr = "the application has id {int}")]
async fn then_created_id(world: &mut PersistenceWorld, id: i64) {
    assert_eq!(world.created().key(), Some(&json!(id)));
}

#[then("the application exists")]
async fn then_created_exists(world: &mut PersistenceWorld) {
    assert!(world.created().exists());
    assert!(world.created().get_dirty().is_empty());
}

#[then(expr = "the call fails with a {word} error")]
async fn then_fails_with(world: &mut PersistenceWorld, kind: String) {
    let err = world.error();
    let matched = match kind.as_str() {
        "configuration" => err.is_configuration_error(),
        "validation" => err.is_validation_error(),
        "protocol" => err.is_protocol_error(),
        "query" => err.query_error().is_some(),
        other => panic!("unknown error kind {other}"),
    };
    assert!(matched, "expected a {kind} error, got {err:?}");
}

#[then(expr = "field {string} was reported as {string}")]
async fn then_field_error(world: &mut PersistenceWorld, field: String, message: String) {
    let fields = world.error().validation_errors().expect("validation error");
    assert_eq!(fields.get(&field), Some(&Value::String(message)));
}

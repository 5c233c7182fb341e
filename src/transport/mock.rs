//! Scripted transport for testing.
//!
//! Responses are consumed in the order they were queued and every request
//! the client makes is recorded, so tests can assert on both sides of the
//! exchange without a network.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::{HttpRequest, HttpResponse, Transport, TransportError};
use crate::mason::MEDIA_TYPE;

/// A canned response.
#[derive(Debug, Clone)]
pub struct MockResponse(HttpResponse);

impl MockResponse {
    /// A Mason document with the given status.
    pub fn mason(status: u16, body: Value) -> Self {
        Self::raw(status, MEDIA_TYPE, body.to_string())
    }

    /// A successful Mason document.
    pub fn ok(body: Value) -> Self {
        Self::mason(200, body)
    }

    /// A successful Mason collection envelope.
    pub fn collection(items: Vec<Value>) -> Self {
        let total = items.len();
        Self::ok(serde_json::json!({ "items": items, "total": total }))
    }

    /// An HTML page, which the client must reject.
    pub fn html(status: u16, body: impl Into<String>) -> Self {
        Self::raw(status, "text/html", body.into())
    }

    /// A response with an arbitrary content type.
    pub fn raw(status: u16, content_type: &str, body: impl Into<String>) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), content_type.to_string());
        Self(HttpResponse {
            status,
            headers,
            body: body.into(),
        })
    }

    pub fn into_inner(self) -> HttpResponse {
        self.0
    }
}

#[derive(Default)]
struct MockState {
    responses: VecDeque<MockResponse>,
    history: Vec<HttpRequest>,
}

/// Transport that replays queued responses.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

/// Handle kept by tests after the transport moved into a client.
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                responses: responses.into(),
                history: Vec::new(),
            })),
        }
    }

    /// A handle sharing this transport's queue and history.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockHandle {
    /// Append more responses to the queue.
    pub fn push(&self, response: MockResponse) {
        lock(&self.state).responses.push_back(response);
    }

    /// Replace the queue and clear the recorded history.
    pub fn reset(&self, responses: Vec<MockResponse>) {
        let mut state = lock(&self.state);
        state.responses = responses.into();
        state.history.clear();
    }

    /// Every request made so far, oldest first.
    pub fn history(&self) -> Vec<HttpRequest> {
        lock(&self.state).history.clone()
    }

    /// Number of queued responses not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.state).responses.len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut state = lock(&self.state);
        let description = format!("{} {}", request.verb, request.url);
        state.history.push(request);

        state
            .responses
            .pop_front()
            .map(MockResponse::into_inner)
            .ok_or(TransportError::Exhausted(description))
    }
}

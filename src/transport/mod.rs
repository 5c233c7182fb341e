//! HTTP transport boundary.
//!
//! The SDK only needs one capability from its HTTP stack: send a verb, URL,
//! headers, query string and optional JSON body, and hand back the status,
//! headers and raw body. [`Transport`] is that seam.
//!
//! Implementations:
//! - [`HttpTransport`]: reqwest-backed production transport
//! - [`MockTransport`]: scripted responses plus request history, for tests

mod http;
mod mock;

pub use http::HttpTransport;
pub use mock::{MockHandle, MockResponse, MockTransport};

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// HTTP verbs used against the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl Verb {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request options compiled by the grammar.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestOptions {
    /// Query-string parameters, in compilation order.
    pub query: Vec<(String, String)>,

    /// JSON request body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
}

impl RequestOptions {
    pub fn with_json(json: Value) -> Self {
        Self {
            query: Vec::new(),
            json: Some(json),
        }
    }

    /// First query-string value recorded for `key`.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// One outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub verb: Verb,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub options: RequestOptions,
}

/// One incoming response, status and body untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Failures below the HTTP layer: no response was produced.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Network, TLS or timeout failure from reqwest.
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The URL could not be resolved against the base URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The scripted transport ran out of responses.
    #[error("mock queue is empty; unexpected {0}")]
    Exhausted(String),
}

impl TransportError {
    /// Returns true if the failure looks like a dropped or refused connection.
    pub fn is_connection_error(&self) -> bool {
        match self {
            TransportError::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

/// Executes a single HTTP request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

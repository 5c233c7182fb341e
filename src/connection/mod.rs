//! API client: executes one request at a time and classifies failures.
//!
//! Every request goes through [`Client::request`], which
//! - sends the configured default headers,
//! - maps 401 to [`Error::Configuration`] and 422 to [`Error::Validation`],
//! - wraps any other failure in a [`QueryError`],
//! - rejects successful responses that are not Mason documents,
//! - records the request in the query log and notifies the listener,
//!   whether or not the request succeeded.

mod retry;

pub use retry::{DroppedConnection, LostConnection, NeverLost};

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{truncate, Error, QueryCause, QueryError, Result};
use crate::mason;
use crate::query::{Grammar, MasonGrammar, MasonProcessor, Processor, QueryBuilder};
use crate::transport::{
    HttpRequest, HttpResponse, HttpTransport, MockHandle, MockResponse, MockTransport,
    RequestOptions, Transport, Verb,
};

/// Longest body snippet quoted in a protocol error.
const MAX_PROTOCOL_SNIPPET: usize = 200;

const BAD_CREDENTIALS: &str = "Missing or invalid API login credentials";

/// A completed request, as seen by the query log and the listener.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEvent {
    pub verb: Verb,
    pub url: String,
    pub options: RequestOptions,
    pub elapsed: Duration,
    /// False when the request ended in an error.
    pub succeeded: bool,
}

/// Callback invoked after every request.
pub type RequestListener = Arc<dyn Fn(&RequestEvent) + Send + Sync>;

/// Client for the Mason hypermedia API.
pub struct Client {
    headers: BTreeMap<String, String>,
    transport: Arc<dyn Transport>,
    grammar: Arc<dyn Grammar>,
    processor: Arc<dyn Processor>,
    listener: Option<RequestListener>,
    lost_connection: Arc<dyn LostConnection>,
    logging: AtomicBool,
    query_log: Mutex<Vec<RequestEvent>>,
}

impl Client {
    /// Create a client speaking HTTP through reqwest.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config.url, config.verify_ssl, config.timeout())?;
        Ok(Self::with_transport(config.default_headers(), Arc::new(transport)))
    }

    /// Create a client over an arbitrary transport.
    pub fn new(config: &ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_transport(config.default_headers(), transport))
    }

    /// Create a client replaying `responses`, plus a handle to inspect the
    /// requests it makes.
    pub fn mock(responses: Vec<MockResponse>) -> (Self, MockHandle) {
        let transport = MockTransport::new(responses);
        let handle = transport.handle();
        let client = Self::with_transport(
            ClientConfig::default().default_headers(),
            Arc::new(transport),
        );
        (client, handle)
    }

    fn with_transport(headers: BTreeMap<String, String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            headers,
            transport,
            grammar: Arc::new(MasonGrammar),
            processor: Arc::new(MasonProcessor),
            listener: None,
            lost_connection: Arc::new(NeverLost),
            logging: AtomicBool::new(false),
            query_log: Mutex::new(Vec::new()),
        }
    }

    /// Register a callback run after every request, success or failure.
    pub fn listen<F>(mut self, listener: F) -> Self
    where
        F: Fn(&RequestEvent) + Send + Sync + 'static,
    {
        self.listener = Some(Arc::new(listener));
        self
    }

    /// Replace the lost-connection classifier.
    pub fn with_lost_connection(mut self, classifier: impl LostConnection + 'static) -> Self {
        self.lost_connection = Arc::new(classifier);
        self
    }

    /// Replace the query grammar.
    pub fn with_grammar(mut self, grammar: impl Grammar + 'static) -> Self {
        self.grammar = Arc::new(grammar);
        self
    }

    /// Replace the response processor.
    pub fn with_processor(mut self, processor: impl Processor + 'static) -> Self {
        self.processor = Arc::new(processor);
        self
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn grammar(&self) -> &dyn Grammar {
        self.grammar.as_ref()
    }

    pub fn processor(&self) -> &dyn Processor {
        self.processor.as_ref()
    }

    /// Start a query against a service path such as `/listeners/{id}`.
    pub fn query(self: &Arc<Self>, path: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(Arc::clone(self)).from(path, BTreeMap::new())
    }

    /// GET a document. A 404 yields `None`.
    pub async fn select(&self, url: &str, options: RequestOptions) -> Result<Option<Value>> {
        match self.request(Verb::Get, url, options).await {
            Ok(document) => Ok(Some(document)),
            Err(Error::Query(err)) if err.status() == Some(404) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// GET a collection and return its first item.
    pub async fn select_one(&self, url: &str, options: RequestOptions) -> Result<Option<Value>> {
        let document = self.select(url, options).await?;
        Ok(document.map(|doc| self.processor.process_select(doc)).and_then(|items| items.into_iter().next()))
    }

    pub async fn insert(&self, url: &str, options: RequestOptions) -> Result<Value> {
        self.request(Verb::Post, url, options).await
    }

    pub async fn update(&self, url: &str, options: RequestOptions) -> Result<Value> {
        self.request(Verb::Put, url, options).await
    }

    pub async fn delete(&self, url: &str, options: RequestOptions) -> Result<Value> {
        self.request(Verb::Delete, url, options).await
    }

    /// Execute one request and decode the Mason body.
    ///
    /// An empty body decodes to `Value::Null`.
    pub async fn request(&self, verb: Verb, url: &str, options: RequestOptions) -> Result<Value> {
        let started = Instant::now();
        let result = self.run(verb, url, &options).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(_) => debug!(verb = %verb, url = %url, elapsed_ms = elapsed.as_millis() as u64, "API request completed"),
            Err(e) => warn!(verb = %verb, url = %url, elapsed_ms = elapsed.as_millis() as u64, error = %e, "API request failed"),
        }

        let event = RequestEvent {
            verb,
            url: url.to_string(),
            options,
            elapsed,
            succeeded: result.is_ok(),
        };
        if self.logging() {
            lock(&self.query_log).push(event.clone());
        }
        if let Some(listener) = &self.listener {
            // A failing listener must not replace the request's own outcome.
            if panic::catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                warn!(verb = %verb, url = %url, "Request listener panicked");
            }
        }

        result
    }

    async fn run(&self, verb: Verb, url: &str, options: &RequestOptions) -> Result<Value> {
        let request = HttpRequest {
            verb,
            url: url.to_string(),
            headers: self.headers.clone(),
            options: options.clone(),
        };

        let response = match self.transport.execute(request.clone()).await {
            Ok(response) => response,
            Err(err) if self.lost_connection.caused_by_lost_connection(&err) => {
                warn!(verb = %verb, url = %url, error = %err, "Connection lost, retrying once");
                self.transport.execute(request).await.map_err(|err| {
                    QueryError::new(verb, url, options.clone(), QueryCause::Transport(err))
                })?
            }
            Err(err) => {
                return Err(
                    QueryError::new(verb, url, options.clone(), QueryCause::Transport(err)).into(),
                )
            }
        };

        interpret(verb, url, options, response)
    }

    /// Start recording requests in the query log.
    pub fn enable_query_log(&self) {
        self.logging.store(true, Ordering::SeqCst);
    }

    pub fn disable_query_log(&self) {
        self.logging.store(false, Ordering::SeqCst);
    }

    /// Whether the query log is recording.
    pub fn logging(&self) -> bool {
        self.logging.load(Ordering::SeqCst)
    }

    pub fn query_log(&self) -> Vec<RequestEvent> {
        lock(&self.query_log).clone()
    }

    pub fn flush_query_log(&self) {
        lock(&self.query_log).clear();
    }
}

fn lock(log: &Mutex<Vec<RequestEvent>>) -> MutexGuard<'_, Vec<RequestEvent>> {
    log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Classify a raw response. Error statuses are checked before the content
/// type, so a 404 stays a 404 whatever body the server sent with it.
fn interpret(
    verb: Verb,
    url: &str,
    options: &RequestOptions,
    response: HttpResponse,
) -> Result<Value> {
    match response.status {
        401 => return Err(Error::Configuration(BAD_CREDENTIALS.to_string())),
        422 => {
            let document: Value = serde_json::from_str(&response.body).unwrap_or(Value::Null);
            return Err(Error::Validation {
                fields: mason::error_fields(&document),
            });
        }
        status if status >= 400 => {
            return Err(QueryError::new(
                verb,
                url,
                options.clone(),
                QueryCause::Status {
                    status,
                    body: response.body,
                },
            )
            .into())
        }
        _ => {}
    }

    let is_mason = response
        .header("content-type")
        .map(mason::is_mason_content_type)
        .unwrap_or(false);
    if !is_mason {
        return Err(Error::Protocol {
            snippet: truncate(&response.body, MAX_PROTOCOL_SNIPPET),
        });
    }

    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&response.body)?)
}

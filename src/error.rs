//! Error types for the SDK.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::transport::{RequestOptions, TransportError, Verb};

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Longest response body quoted verbatim in a [`QueryError`] message.
const MAX_QUOTED_BODY: usize = 1000;

/// Errors that can occur while talking to the API or manipulating models.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Credentials were missing or rejected (HTTP 401).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The API rejected the payload with field-level messages (HTTP 422).
    #[error("validation failed: {}", format_fields(.fields))]
    Validation { fields: BTreeMap<String, Value> },

    /// The response was not a Mason document.
    #[error("API response is not a Mason document: {snippet}")]
    Protocol { snippet: String },

    /// Any other transport or HTTP failure.
    #[error(transparent)]
    Query(Box<QueryError>),

    /// A guarded attribute was mass-assigned on a totally guarded model.
    #[error("mass assignment of [{key}] is not allowed")]
    MassAssignment { key: String },

    /// `find_or_fail`/`first_or_fail` matched fewer records than requested.
    #[error("no query results for model [{model}] {}", format_ids(.ids))]
    ModelNotFound { model: String, ids: Vec<Value> },

    /// A row carried a discriminator that no registered subtype owns.
    #[error("cannot construct model for unrecognized {field}={value}")]
    UnrecognizedType { field: String, value: String },

    /// A row or a save carried attributes outside the subtype's allowlist.
    #[error("{model} has invalid attributes: {}", .attributes.join(","))]
    InvalidAttributes {
        model: String,
        attributes: Vec<String>,
    },

    /// Invalid argument provided by caller.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The model schema catalog is inconsistent.
    #[error("boot error: {0}")]
    Boot(String),

    /// `delete` was called on a model without a primary key.
    #[error("no primary key defined on model [{0}]")]
    MissingPrimaryKey(String),

    /// A date attribute could not be parsed or formatted.
    #[error("invalid date for [{key}]: {message}")]
    InvalidDate { key: String, message: String },

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration sources could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    /// The HTTP client could not be constructed.
    #[error("http client error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(Box::new(err))
    }
}

impl Error {
    /// Returns true if this is a credentials problem.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    /// Returns true if the API rejected the payload.
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }

    /// Returns true if the response was not a Mason document.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol { .. })
    }

    /// Returns true if a required model could not be found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ModelNotFound { .. })
            || matches!(self, Error::Query(q) if q.status() == Some(404))
    }

    /// Field-level messages of a validation failure.
    pub fn validation_errors(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Error::Validation { fields } => Some(fields),
            _ => None,
        }
    }

    /// The underlying query error, if this is one.
    pub fn query_error(&self) -> Option<&QueryError> {
        match self {
            Error::Query(q) => Some(q),
            _ => None,
        }
    }
}

/// A failed request, with everything needed to reproduce it.
#[derive(Debug)]
pub struct QueryError {
    verb: Verb,
    url: String,
    options: RequestOptions,
    cause: QueryCause,
}

/// What went wrong underneath a [`QueryError`].
#[derive(Debug)]
pub enum QueryCause {
    /// The transport never produced a response.
    Transport(TransportError),
    /// The API answered with an error status.
    Status { status: u16, body: String },
}

impl QueryError {
    pub fn new(verb: Verb, url: impl Into<String>, options: RequestOptions, cause: QueryCause) -> Self {
        Self {
            verb,
            url: url.into(),
            options,
            cause,
        }
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    pub fn cause(&self) -> &QueryCause {
        &self.cause
    }

    /// HTTP status of the failed response, if one was received.
    pub fn status(&self) -> Option<u16> {
        match &self.cause {
            QueryCause::Status { status, .. } => Some(*status),
            QueryCause::Transport(_) => None,
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            QueryCause::Transport(err) => write!(f, "{err}")?,
            QueryCause::Status { status, body } => {
                write!(f, "HTTP {status}")?;
                if !body.is_empty() {
                    write!(f, " {}", truncate(body, MAX_QUOTED_BODY))?;
                }
            }
        }
        let options = serde_json::to_string(&self.options).unwrap_or_default();
        write!(f, " in response to {} {} {}", self.verb, self.url, options)
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            QueryCause::Transport(err) => Some(err),
            QueryCause::Status { .. } => None,
        }
    }
}

/// Cut `value` down to `limit` characters, marking the cut with an ellipsis.
pub(crate) fn truncate(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let cut: String = value.chars().take(limit).collect();
    format!("{}...", cut.trim_end())
}

fn format_fields(fields: &BTreeMap<String, Value>) -> String {
    serde_json::to_string(fields).unwrap_or_default()
}

fn format_ids(ids: &[Value]) -> String {
    ids.iter()
        .map(|id| match id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

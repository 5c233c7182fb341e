//! reqwest-backed transport.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use tracing::trace;

use super::{HttpRequest, HttpResponse, Transport, TransportError, Verb};

/// Production transport speaking HTTP through reqwest.
///
/// Relative request URLs are resolved against the base URL; absolute URLs
/// (self links taken from Mason documents) are used as-is.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the given base URL.
    pub fn new(
        base_url: impl Into<String>,
        verify_ssl: bool,
        timeout: Option<Duration>,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder().danger_accept_invalid_certs(!verify_ssl);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.into(),
        })
    }

    fn resolve(&self, url: &str) -> Result<String, TransportError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(url.to_string());
        }
        if self.base_url.is_empty() {
            return Err(TransportError::InvalidUrl(url.to_string()));
        }

        Ok(format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            url.trim_start_matches('/')
        ))
    }
}

fn method(verb: Verb) -> Method {
    match verb {
        Verb::Get => Method::GET,
        Verb::Post => Method::POST,
        Verb::Put => Method::PUT,
        Verb::Delete => Method::DELETE,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = self.resolve(&request.url)?;

        let mut builder = self.client.request(method(request.verb), &url);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if !request.options.query.is_empty() {
            builder = builder.query(&request.options.query);
        }
        if let Some(json) = &request.options.json {
            builder = builder.json(json);
        }

        let response = builder.send().await?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response.text().await?;

        trace!(url = %url, status, "HTTP response received");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

//! Client connection configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;

use super::{
    AUTHORIZATION_HEADER, CONFIG_ENV_PREFIX, CONFIG_ENV_VAR, DEFAULT_BASE_URL,
    DEFAULT_CONFIG_FILE, HEADERS_ENV_VAR, LOG_ENV_VAR, PREFER_HEADER, PREFER_MINIMAL,
};
use crate::error::{Error, Result};

/// Connection settings for the API client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL where the API is located.
    pub url: String,
    /// Additional default headers sent with every request.
    pub headers: BTreeMap<String, String>,
    /// Basic-auth username.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// Debug mode asks the API for full representations.
    pub debug: bool,
    /// Verify TLS certificates.
    pub verify_ssl: bool,
    /// Request timeout in seconds, if any.
    pub timeout_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BASE_URL.to_string(),
            headers: BTreeMap::new(),
            username: None,
            password: None,
            debug: false,
            verify_ssl: true,
            timeout_secs: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `phonecom.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `PHONECOM_CONFIG` environment variable (if set)
    /// 4. Environment variables with `PHONECOM_` prefix
    /// 5. `PHONECOM_HEADERS`, a JSON object merged into `headers`
    pub fn load(path: Option<&str>) -> Result<Self> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        // These are read separately and must not be mistaken for settings.
        let reserved = [CONFIG_ENV_VAR, HEADERS_ENV_VAR, LOG_ENV_VAR];
        let env: ::config::Map<String, String> = std::env::vars()
            .filter(|(key, _)| !reserved.contains(&key.as_str()))
            .collect();

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(env)),
            )
            .build()?;

        let mut config: ClientConfig = config.try_deserialize()?;

        if let Ok(raw) = std::env::var(HEADERS_ENV_VAR) {
            let headers: BTreeMap<String, String> = serde_json::from_str(&raw)?;
            config.headers.extend(headers);
        }

        Ok(config)
    }

    /// Set the base URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Add a default header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set basic-auth credentials.
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Toggle debug mode.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Toggle TLS certificate verification.
    pub fn with_verify_ssl(mut self, verify_ssl: bool) -> Self {
        self.verify_ssl = verify_ssl;
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs());
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Headers sent with every request: configured headers, then the
    /// `Prefer` header (absent in debug mode), then basic auth.
    pub fn default_headers(&self) -> BTreeMap<String, String> {
        // Header names are case-insensitive; managed headers replace any spelling.
        let mut headers: BTreeMap<String, String> = self
            .headers
            .iter()
            .filter(|(name, _)| {
                !name.eq_ignore_ascii_case(PREFER_HEADER) && !name.eq_ignore_ascii_case(AUTHORIZATION_HEADER)
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        if !self.debug {
            headers.insert(PREFER_HEADER.to_string(), PREFER_MINIMAL.to_string());
        }

        if let (Some(user), Some(pass)) = (self.username.as_deref(), self.password.as_deref()) {
            if !user.is_empty() && !pass.is_empty() {
                let token = STANDARD.encode(format!("{user}:{pass}"));
                headers.insert(AUTHORIZATION_HEADER.to_string(), format!("Basic {token}"));
            }
        }

        headers
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(Error::InvalidArgument("base url is not configured".to_string()));
        }
        Ok(())
    }
}

//! SDK configuration.
//!
//! Connection settings can be built in code or loaded from YAML files and
//! environment variables.

mod client;

pub use client::ClientConfig;

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://v2.api.phone.com";
/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "phonecom.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "PHONECOM_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "PHONECOM";
/// Environment variable holding extra default headers as a JSON object.
pub const HEADERS_ENV_VAR: &str = "PHONECOM_HEADERS";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "PHONECOM_LOG";

/// Header toggled by the debug flag.
pub const PREFER_HEADER: &str = "Prefer";
/// Value sent in the `Prefer` header outside debug mode.
pub const PREFER_MINIMAL: &str = "representation=minimal";
/// Header carrying basic-auth credentials.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

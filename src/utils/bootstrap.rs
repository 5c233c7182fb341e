//! Bootstrap utilities for applications using the SDK.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{ClientConfig, LOG_ENV_VAR};
use crate::connection::Client;
use crate::eloquent::Registry;
use crate::error::Result;
use crate::models;

/// Initialize tracing with the PHONECOM_LOG environment variable.
///
/// Defaults to "info" level if PHONECOM_LOG is not set. Returns false when a
/// global subscriber was already installed.
pub fn init_tracing() -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

/// Load configuration, build the HTTP client and boot the bundled models.
pub fn connect(path: Option<&str>) -> Result<Registry> {
    let config = ClientConfig::load(path)?;
    connect_with(&config)
}

/// [`connect`] with configuration built in code.
pub fn connect_with(config: &ClientConfig) -> Result<Registry> {
    let client = Arc::new(Client::from_config(config)?);
    let registry = models::register(Registry::builder(client)).boot()?;
    info!(url = %config.url, "Connected to phone.com API");
    Ok(registry)
}

//! phone.com API SDK
//!
//! An active-record client for the phone.com Mason hypermedia API. Models
//! represent remote resources, a fluent query builder compiles filtered,
//! sorted and paginated requests, and a client/grammar/processor triad turns
//! builder state into HTTP calls and Mason envelopes back into models.
//!
//! ```no_run
//! use phonecom_sdk::models::Sms;
//! use phonecom_sdk::utils::bootstrap;
//!
//! # async fn run() -> phonecom_sdk::Result<()> {
//! let registry = bootstrap::connect(None)?;
//! let recent = registry
//!     .query::<Sms>()
//!     .where_eq("direction", "in")?
//!     .order_by("created", "desc")
//!     .limit(10)
//!     .get()
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod eloquent;
pub mod error;
pub mod mason;
pub mod models;
pub mod query;
pub mod ssi;
pub mod transport;
pub mod utils;

pub use config::ClientConfig;
pub use connection::{Client, RequestEvent};
pub use eloquent::{Model, ModelQuery, ModelSchema, Registry, Resource};
pub use error::{Error, QueryError, Result};
pub use query::{Operator, QueryBuilder, ResourceId};

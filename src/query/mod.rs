//! Query layer: builder, grammar and processor.
//!
//! A [`QueryBuilder`] accumulates clauses; on a terminal call the client's
//! [`Grammar`] compiles them into a URL and request options, the client runs
//! the request, and its [`Processor`] extracts the result shape.

mod builder;
mod clause;
mod grammar;
mod processor;

pub use builder::{InsertRows, QueryBuilder, MUTATION_CHUNK_SIZE};
pub use clause::{Direction, Operator, Order, Where};
pub use grammar::{Grammar, MasonGrammar};
pub use processor::{MasonProcessor, Processor, ResourceId};

pub(crate) use grammar::scalar;

use std::collections::BTreeMap;

use serde_json::Value;

/// Values substituted into a path template.
pub type PathParams = BTreeMap<String, Value>;

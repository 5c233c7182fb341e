//! Process-level helpers.

pub mod bootstrap;

pub use bootstrap::{connect, connect_with, init_tracing};

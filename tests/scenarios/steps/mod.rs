//! Step definitions, one world per concern.

pub mod persistence;
pub mod querying;

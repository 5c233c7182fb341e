//! Global query scopes.

use super::ModelSchema;
use crate::query::QueryBuilder;

/// A constraint added to every query of a schema unless removed by name.
pub trait Scope: Send + Sync {
    fn name(&self) -> &str;

    /// Add the scope's clauses.
    fn apply(&self, query: QueryBuilder, schema: &ModelSchema) -> QueryBuilder;

    /// Take back exactly what [`apply`](Self::apply) added.
    fn remove(&self, query: &mut QueryBuilder, schema: &ModelSchema);
}

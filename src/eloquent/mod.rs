//! Active-record layer.
//!
//! Model types are declared as [`ModelSchema`]s (usually through the
//! [`Resource`] trait), booted into a [`Registry`], and then queried with
//! [`ModelQuery`] and manipulated as [`Model`] instances.

mod builder;
mod dates;
mod events;
mod model;
mod registry;
mod schema;
mod scope;

pub use builder::ModelQuery;
pub use events::{EventDispatcher, ModelEvent, ModelListener};
pub use model::{Model, Relation};
pub use registry::{Registry, RegistryBuilder};
pub use schema::{CastType, DateFormat, GetMutator, ModelSchema, RelationDef, SetMutator};
pub use scope::Scope;

/// A model type known at compile time.
pub trait Resource {
    /// Schema name; must match the name given to [`ModelSchema::new`].
    const NAME: &'static str;

    fn schema() -> ModelSchema;
}

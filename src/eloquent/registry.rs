//! The model registry.
//!
//! Process-scoped state of the model layer lives here rather than in
//! globals: the client, the booted schema catalog, the lifecycle listeners and
//! the unguarded flag. A registry is cheap to clone and every model carries one.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::info;

use super::{EventDispatcher, Model, ModelEvent, ModelQuery, ModelSchema, Resource, Scope};
use crate::connection::Client;
use crate::error::{Error, Result};
use crate::query::{PathParams, QueryBuilder};
use crate::ssi::{self, SingleServiceScope};

struct Inner {
    client: Arc<Client>,
    schemas: BTreeMap<String, Arc<ModelSchema>>,
    scopes: BTreeMap<String, Vec<Arc<dyn Scope>>>,
    events: EventDispatcher,
    unguarded: AtomicBool,
}

/// Handle to the booted model layer.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("schemas", &self.inner.schemas.keys().collect::<Vec<_>>())
            .field("unguarded", &self.is_unguarded())
            .finish()
    }
}

/// Collects schemas until [`boot`](RegistryBuilder::boot).
pub struct RegistryBuilder {
    client: Arc<Client>,
    schemas: Vec<ModelSchema>,
}

impl RegistryBuilder {
    /// Register a typed resource.
    pub fn resource<R: Resource>(self) -> Self {
        self.schema(R::schema())
    }

    pub fn schema(mut self, schema: ModelSchema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Validate the catalog and resolve single-service data.
    ///
    /// Fails on duplicate names, unknown relation targets or parents, unknown
    /// or cyclic subclasses, and discriminators claimed twice.
    pub fn boot(self) -> Result<Registry> {
        let mut catalog: BTreeMap<String, ModelSchema> = BTreeMap::new();
        for schema in self.schemas {
            let name = schema.name().to_string();
            if catalog.insert(name.clone(), schema).is_some() {
                return Err(Error::Boot(format!("model [{name}] is registered twice")));
            }
        }

        for schema in catalog.values() {
            for (relation, def) in schema.relations() {
                if !catalog.contains_key(&def.target) {
                    return Err(Error::Boot(format!(
                        "relation [{}.{relation}] targets unknown model [{}]",
                        schema.name(),
                        def.target
                    )));
                }
            }
            if let Some(parent) = schema.parent() {
                if !catalog.contains_key(parent) {
                    return Err(Error::Boot(format!(
                        "model [{}] extends unknown model [{parent}]",
                        schema.name()
                    )));
                }
            }
        }

        let mut resolved = ssi::resolve(&catalog)?;

        let mut schemas = BTreeMap::new();
        let mut scopes: BTreeMap<String, Vec<Arc<dyn Scope>>> = BTreeMap::new();
        for (name, mut schema) in catalog {
            if schema.is_single_service() {
                schema.resolved = resolved.remove(&name);
                scopes.insert(name.clone(), vec![Arc::new(SingleServiceScope) as Arc<dyn Scope>]);
            }
            schemas.insert(name, Arc::new(schema));
        }

        info!(models = schemas.len(), "Model registry booted");

        Ok(Registry {
            inner: Arc::new(Inner {
                client: self.client,
                schemas,
                scopes,
                events: EventDispatcher::default(),
                unguarded: AtomicBool::new(false),
            }),
        })
    }
}

impl Registry {
    pub fn builder(client: impl Into<Arc<Client>>) -> RegistryBuilder {
        RegistryBuilder {
            client: client.into(),
            schemas: Vec::new(),
        }
    }

    pub fn client(&self) -> &Arc<Client> {
        &self.inner.client
    }

    /// A booted schema by name.
    pub fn schema(&self, name: &str) -> Result<Arc<ModelSchema>> {
        self.inner
            .schemas
            .get(name)
            .cloned()
            .ok_or_else(|| Error::InvalidArgument(format!("unknown model [{name}]")))
    }

    pub fn schema_names(&self) -> impl Iterator<Item = &str> {
        self.inner.schemas.keys().map(String::as_str)
    }

    pub(crate) fn events(&self) -> &EventDispatcher {
        &self.inner.events
    }

    // --- events ---

    /// Register a lifecycle listener for `R`; higher priorities run first.
    pub fn listen<R, F>(&self, event: ModelEvent, priority: i32, listener: F)
    where
        R: Resource,
        F: Fn(&mut Model) -> Option<bool> + Send + Sync + 'static,
    {
        self.listen_named(R::NAME, event, priority, listener);
    }

    pub fn listen_named<F>(&self, model: &str, event: ModelEvent, priority: i32, listener: F)
    where
        F: Fn(&mut Model) -> Option<bool> + Send + Sync + 'static,
    {
        self.inner.events.listen(model, event, priority, Arc::new(listener));
    }

    pub fn flush_event_listeners<R: Resource>(&self) {
        self.inner.events.forget(R::NAME);
    }

    // --- mass assignment ---

    pub fn unguard(&self) {
        self.inner.unguarded.store(true, Ordering::SeqCst);
    }

    pub fn reguard(&self) {
        self.inner.unguarded.store(false, Ordering::SeqCst);
    }

    pub fn is_unguarded(&self) -> bool {
        self.inner.unguarded.load(Ordering::SeqCst)
    }

    /// Run `f` with mass-assignment protection off, restoring the previous state.
    pub fn unguarded<T>(&self, f: impl FnOnce() -> T) -> T {
        let previous = self.inner.unguarded.swap(true, Ordering::SeqCst);
        let result = f();
        self.inner.unguarded.store(previous, Ordering::SeqCst);
        result
    }

    // --- construction ---

    /// A new, empty model of `R`.
    pub fn make<R: Resource>(&self) -> Result<Model> {
        self.make_named(R::NAME)
    }

    pub fn make_named(&self, name: &str) -> Result<Model> {
        Ok(Model::blank(self.clone(), self.schema(name)?, PathParams::new()))
    }

    /// A new model of `R` filled with `attributes`.
    pub fn new_model<R: Resource>(&self, attributes: Map<String, Value>) -> Result<Model> {
        let mut model = self.make::<R>()?;
        model.fill(attributes)?;
        Ok(model)
    }

    /// Models of `R` from raw rows.
    pub fn hydrate<R: Resource>(&self, rows: Vec<Value>) -> Result<Vec<Model>> {
        self.query::<R>().hydrate(rows)
    }

    // --- queries ---

    pub fn query<R: Resource>(&self) -> ModelQuery {
        self.query_named(R::NAME).unwrap_or_else(|_| self.unregistered(R::schema()))
    }

    pub fn query_named(&self, name: &str) -> Result<ModelQuery> {
        Ok(self.query_for(self.schema(name)?, PathParams::new()))
    }

    /// A query for a resource that was never registered: no scopes, no
    /// resolved single-service data.
    fn unregistered(&self, schema: ModelSchema) -> ModelQuery {
        self.query_for(Arc::new(schema), PathParams::new())
    }

    pub(crate) fn query_for(&self, schema: Arc<ModelSchema>, path_params: PathParams) -> ModelQuery {
        let base = QueryBuilder::new(Arc::clone(&self.inner.client)).from(schema.path().to_string(), path_params);
        let scopes = self.inner.scopes.get(schema.name()).cloned().unwrap_or_default();
        ModelQuery::new(self.clone(), schema, base, scopes)
    }

    pub async fn all<R: Resource>(&self) -> Result<Vec<Model>> {
        self.query::<R>().get().await
    }

    pub async fn find<R: Resource>(&self, id: impl Into<Value>) -> Result<Option<Model>> {
        self.query::<R>().find(id).await
    }

    /// The record with `id`, or a new model carrying that id.
    pub async fn find_or_new<R: Resource>(&self, id: impl Into<Value>) -> Result<Model> {
        let id = id.into();
        if let Some(model) = self.find::<R>(id.clone()).await? {
            return Ok(model);
        }
        let mut model = self.make::<R>()?;
        if let Some(key) = model.schema().key_name().map(str::to_string) {
            model.set_attribute(&key, id)?;
        }
        Ok(model)
    }

    /// Fill and save a new model of `R`.
    pub async fn create<R: Resource>(&self, attributes: Map<String, Value>) -> Result<Model> {
        let mut model = self.new_model::<R>(attributes)?;
        model.save().await?;
        Ok(model)
    }

    /// [`create`](Self::create) returning every resource the service created.
    /// Collection-returning services such as `/sms` answer one insert with a
    /// record per recipient.
    pub async fn create_many<R: Resource>(&self, attributes: Map<String, Value>) -> Result<Vec<Model>> {
        let mut model = self.create::<R>(attributes).await?;
        let rest = model.take_created_alongside();
        Ok(std::iter::once(model).chain(rest).collect())
    }

    /// [`create`](Self::create) ignoring the mass-assignment policy.
    pub async fn force_create<R: Resource>(&self, attributes: Map<String, Value>) -> Result<Model> {
        let mut model = self.make::<R>()?;
        model.force_fill(attributes)?;
        model.save().await?;
        Ok(model)
    }

    /// The first record matching `attributes`, or a new unsaved model of them.
    pub async fn first_or_new<R: Resource>(&self, attributes: Map<String, Value>) -> Result<Model> {
        let query = self.query::<R>().where_all(attributes.clone())?;
        match query.first().await? {
            Some(model) => Ok(model),
            None => self.new_model::<R>(attributes),
        }
    }

    /// The first record matching `attributes`, or a newly created one.
    pub async fn first_or_create<R: Resource>(&self, attributes: Map<String, Value>) -> Result<Model> {
        let mut model = self.first_or_new::<R>(attributes).await?;
        if !model.exists() {
            model.save().await?;
        }
        Ok(model)
    }

    /// Find by `attributes`, then fill `values` and save.
    pub async fn update_or_create<R: Resource>(
        &self,
        attributes: Map<String, Value>,
        values: Map<String, Value>,
    ) -> Result<Model> {
        let mut model = self.first_or_new::<R>(attributes).await?;
        model.fill(values)?;
        model.save().await?;
        Ok(model)
    }

    /// Delete the records with the given ids, one request each. Returns how
    /// many were deleted.
    pub async fn destroy<R: Resource>(&self, ids: Vec<Value>) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut deleted = 0;
        for mut model in self.query::<R>().find_many(ids).await? {
            if model.delete().await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

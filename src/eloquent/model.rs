//! Active-record model instances.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use super::dates::{as_date_time, format_date};
use super::schema::{numeric, truthy, ModelSchema};
use super::{ModelEvent, ModelQuery, Registry};
use crate::error::{truncate, Error, Result};
use crate::mason;
use crate::query::PathParams;
use crate::ssi;
use crate::transport::RequestOptions;

/// Related models hydrated from an embedded attribute.
#[derive(Debug, Clone)]
pub enum Relation {
    One(Box<Model>),
    Many(Vec<Model>),
}

impl Relation {
    pub fn as_one(&self) -> Option<&Model> {
        match self {
            Relation::One(model) => Some(model),
            Relation::Many(_) => None,
        }
    }

    pub fn as_many(&self) -> Option<&[Model]> {
        match self {
            Relation::One(_) => None,
            Relation::Many(models) => Some(models),
        }
    }

    fn to_value(&self) -> Result<Value> {
        match self {
            Relation::One(model) => Ok(Value::Object(model.to_array()?)),
            Relation::Many(models) => models
                .iter()
                .map(|model| model.to_array().map(Value::Object))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
        }
    }
}

/// One remote resource.
///
/// A model starts out new (`exists() == false`), becomes persisted once saved
/// or hydrated from a response, and is new again after [`delete`](Self::delete).
#[derive(Clone)]
pub struct Model {
    registry: Registry,
    schema: Arc<ModelSchema>,
    attributes: Map<String, Value>,
    original: Map<String, Value>,
    relations: BTreeMap<String, Relation>,
    path_params: PathParams,
    self_url: Option<String>,
    exists: bool,
    /// Further resources created by the same collection-returning insert.
    batch: Vec<Model>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.schema.name())
            .field("attributes", &self.attributes)
            .field("relations", &self.relations)
            .field("self_url", &self.self_url)
            .field("exists", &self.exists)
            .field("batch", &self.batch.len())
            .finish()
    }
}

impl Model {
    pub(crate) fn blank(registry: Registry, schema: Arc<ModelSchema>, path_params: PathParams) -> Self {
        Self {
            registry,
            schema,
            attributes: Map::new(),
            original: Map::new(),
            relations: BTreeMap::new(),
            path_params,
            self_url: None,
            exists: false,
            batch: Vec::new(),
        }
    }

    /// Hydrate one response row, dispatching single-service schemas to the
    /// subtype named by the row's discriminator.
    pub(crate) fn from_row(
        registry: &Registry,
        schema: Arc<ModelSchema>,
        row: Value,
        path_params: &PathParams,
    ) -> Result<Self> {
        let Value::Object(row) = row else {
            return Err(Error::Protocol {
                snippet: truncate(&row.to_string(), 200),
            });
        };

        if schema.is_single_service() {
            return ssi::new_from_builder(registry, &schema, row, path_params);
        }

        let mut model = Model::blank(registry.clone(), schema, path_params.clone());
        model.exists = true;
        model.set_raw_attributes(row, true)?;
        Ok(model)
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub(crate) fn set_exists(&mut self, exists: bool) {
        self.exists = exists;
    }

    /// Canonical URL discovered from `@controls.self.href`.
    pub fn self_url(&self) -> Option<&str> {
        self.self_url.as_deref()
    }

    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    /// Bind a parameter of the schema's path template.
    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub(crate) fn attributes_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.attributes
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub fn relations(&self) -> &BTreeMap<String, Relation> {
        &self.relations
    }

    /// Resources created together with this one when the service answered an
    /// insert with several records, e.g. one message per recipient.
    pub fn created_alongside(&self) -> &[Model] {
        &self.batch
    }

    pub fn take_created_alongside(&mut self) -> Vec<Model> {
        std::mem::take(&mut self.batch)
    }

    /// Value of the primary key, if the schema has one and it is set.
    pub fn key(&self) -> Option<&Value> {
        self.attributes.get(self.schema.key_name()?)
    }

    // --- mass assignment ---

    /// Set attributes through the schema's fillable/guarded policy.
    ///
    /// Keys that are not fillable are skipped, except on a totally guarded
    /// schema where they fail with [`Error::MassAssignment`].
    pub fn fill(&mut self, attributes: Map<String, Value>) -> Result<&mut Self> {
        let unguarded = self.registry.is_unguarded();
        self.fill_with(attributes, unguarded)
    }

    /// Set attributes ignoring the mass-assignment policy.
    pub fn force_fill(&mut self, attributes: Map<String, Value>) -> Result<&mut Self> {
        self.fill_with(attributes, true)
    }

    fn fill_with(&mut self, attributes: Map<String, Value>, unguarded: bool) -> Result<&mut Self> {
        let totally_guarded = self.totally_guarded();

        for (key, value) in attributes {
            if unguarded || self.is_fillable(&key) {
                self.set_attribute(&key, value)?;
            } else if totally_guarded {
                return Err(Error::MassAssignment { key });
            }
        }

        Ok(self)
    }

    pub fn is_fillable(&self, key: &str) -> bool {
        if self.registry.is_unguarded() || self.schema.fillable_keys().iter().any(|k| k == key) {
            return true;
        }
        if self.is_guarded(key) {
            return false;
        }
        self.schema.fillable_keys().is_empty() && !key.starts_with('_')
    }

    pub fn is_guarded(&self, key: &str) -> bool {
        let guarded = self.schema.guarded_keys();
        guarded.iter().any(|k| k == key) || guarded == ["*"]
    }

    pub fn totally_guarded(&self) -> bool {
        self.schema.fillable_keys().is_empty() && self.schema.guarded_keys() == ["*"]
    }

    // --- attributes ---

    /// Read an attribute: read mutator, else declared cast, else raw.
    pub fn get_attribute(&self, key: &str) -> Option<Value> {
        if let Some(getter) = self.schema.getter(key) {
            return Some(getter(self.attributes.get(key).unwrap_or(&Value::Null)));
        }

        let raw = self.attributes.get(key)?;
        Some(match self.schema.cast_type(key) {
            Some(cast) => cast.apply(raw),
            None => raw.clone(),
        })
    }

    /// Write an attribute: write mutator, else date formatting, else JSON
    /// encoding for JSON casts, else raw.
    pub fn set_attribute(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        let mut value = value.into();

        if let Some(setter) = self.schema.setter(key).cloned() {
            self.attributes.insert(key.to_string(), setter(value));
            return Ok(());
        }

        if self.schema.is_date(key) && truthy(&value) {
            let format = self.schema.get_date_format();
            let date = as_date_time(&value, format).map_err(|message| invalid_date(key, message))?;
            value = format_date(&date, format).map_err(|message| invalid_date(key, message))?;
        }

        if self.schema.cast_type(key).is_some_and(|cast| cast.is_json()) && !value.is_null() {
            value = Value::String(serde_json::to_string(&value)?);
        }

        self.attributes.insert(key.to_string(), value);
        Ok(())
    }

    pub fn unset_attribute(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }

    /// A date attribute as a timestamp.
    pub fn get_date(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        match self.attributes.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => as_date_time(value, self.schema.get_date_format())
                .map(Some)
                .map_err(|message| invalid_date(key, message)),
        }
    }

    pub fn set_date(&mut self, key: &str, date: DateTime<Utc>) -> Result<()> {
        let value =
            format_date(&date, self.schema.get_date_format()).map_err(|message| invalid_date(key, message))?;
        self.attributes.insert(key.to_string(), value);
        Ok(())
    }

    // --- dirty tracking ---

    /// Attributes changed since the last sync. `5` and `"5"` are the same value.
    pub fn get_dirty(&self) -> Map<String, Value> {
        self.attributes
            .iter()
            .filter(|(key, value)| match self.original.get(*key) {
                None => true,
                Some(original) => !equivalent(value, original),
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Whether any of `keys` is dirty; with no keys, whether anything is.
    pub fn is_dirty(&self, keys: &[&str]) -> bool {
        let dirty = self.get_dirty();
        if keys.is_empty() {
            return !dirty.is_empty();
        }
        keys.iter().any(|key| dirty.contains_key(*key))
    }

    pub fn original(&self) -> &Map<String, Value> {
        &self.original
    }

    pub fn get_original(&self, key: &str) -> Option<&Value> {
        self.original.get(key)
    }

    pub fn sync_original(&mut self) {
        self.original = self.attributes.clone();
    }

    pub fn sync_original_attribute(&mut self, key: &str) {
        match self.attributes.get(key) {
            Some(value) => {
                self.original.insert(key.to_string(), value.clone());
            }
            None => {
                self.original.remove(key);
            }
        }
    }

    /// Replace the attributes with a response row: meta-properties are
    /// stripped, the self link is kept aside and embedded relations hydrate
    /// into models of their own.
    pub(crate) fn set_raw_attributes(&mut self, mut attributes: Map<String, Value>, sync: bool) -> Result<()> {
        if let Some(controls) = attributes.get(mason::CONTROLS) {
            let document = Value::Object(Map::from_iter([(mason::CONTROLS.to_string(), controls.clone())]));
            if let Some(href) = mason::self_href(&document) {
                self.self_url = Some(href.to_string());
            }
        }
        attributes.retain(|key, _| !mason::is_meta_key(key));

        self.relations.clear();
        let schema = Arc::clone(&self.schema);
        for (name, relation) in schema.relations() {
            if attributes.get(name).map_or(true, Value::is_null) {
                continue;
            }
            let Some(value) = attributes.remove(name) else {
                continue;
            };

            let target = self.registry.schema(&relation.target)?;
            let hydrated = if relation.many {
                let rows = match value {
                    Value::Array(items) => items,
                    Value::Object(mut envelope) if envelope.contains_key("items") => {
                        match envelope.remove("items") {
                            Some(Value::Array(items)) => items,
                            _ => Vec::new(),
                        }
                    }
                    other => vec![other],
                };
                Relation::Many(
                    rows.into_iter()
                        .map(|row| Model::from_row(&self.registry, Arc::clone(&target), row, &self.path_params))
                        .collect::<Result<_>>()?,
                )
            } else {
                Relation::One(Box::new(Model::from_row(
                    &self.registry,
                    target,
                    value,
                    &self.path_params,
                )?))
            };
            self.relations.insert(name.clone(), hydrated);
        }

        attributes.values_mut().for_each(mason::strip_meta);
        self.attributes = attributes;
        if sync {
            self.sync_original();
        }
        Ok(())
    }

    // --- export ---

    /// Arrayable attributes with dates serialized, mutators and casts
    /// applied, and relations nested.
    pub fn to_array(&self) -> Result<Map<String, Value>> {
        let schema = &self.schema;
        let mut out: Map<String, Value> = self
            .attributes
            .iter()
            .filter(|(key, _)| schema.is_arrayable(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let format = schema.get_date_format();
        for key in schema.date_keys() {
            if let Some(value) = out.get_mut(key) {
                if value.is_null() {
                    continue;
                }
                let date = as_date_time(value, format).map_err(|message| invalid_date(key, message))?;
                *value = format_date(&date, format).map_err(|message| invalid_date(key, message))?;
            }
        }

        for key in schema.mutated_attributes() {
            if let (Some(value), Some(getter)) = (out.get_mut(key), schema.getter(key)) {
                *value = getter(value);
            }
        }

        for (key, cast) in schema.casts() {
            if schema.getter(key).is_some() {
                continue;
            }
            if let Some(value) = out.get_mut(key) {
                *value = cast.apply(value);
            }
        }

        for (name, relation) in &self.relations {
            if schema.is_arrayable(name) {
                out.insert(name.clone(), relation.to_value()?);
            }
        }

        Ok(out)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_array()?)?)
    }

    /// A new, unsaved copy without the `except` attributes (the primary key
    /// when `None`).
    pub fn replicate(&self, except: Option<&[&str]>) -> Model {
        let default_except: Vec<&str> = self.schema.key_name().into_iter().collect();
        let except = except.unwrap_or(&default_except);

        let mut copy = Model::blank(self.registry.clone(), Arc::clone(&self.schema), self.path_params.clone());
        copy.attributes = self
            .attributes
            .iter()
            .filter(|(key, _)| !except.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        copy.relations = self.relations.clone();
        copy
    }

    // --- persistence ---

    /// A query against this model's service, with global scopes applied.
    pub fn query(&self) -> ModelQuery {
        self.registry.query_for(Arc::clone(&self.schema), self.path_params.clone())
    }

    pub fn query_without_scopes(&self) -> ModelQuery {
        self.query().without_global_scopes()
    }

    /// Query matching this record by primary key.
    fn keyed_query(&self) -> Result<ModelQuery> {
        let key = self
            .schema
            .key_name()
            .ok_or_else(|| Error::MissingPrimaryKey(self.name().to_string()))?;
        let value = self
            .original
            .get(key)
            .or_else(|| self.attributes.get(key))
            .cloned()
            .unwrap_or(Value::Null);
        self.query_without_scopes().where_eq(key, value)
    }

    fn fire(&mut self, event: ModelEvent) -> Option<bool> {
        let registry = self.registry.clone();
        registry.events().fire(self, event)
    }

    /// Insert or update. Returns `false` when a listener cancelled.
    pub async fn save(&mut self) -> Result<bool> {
        ssi::prepare_for_save(self)?;

        if self.fire(ModelEvent::Saving) == Some(false) {
            debug!(model = %self.name(), "Save cancelled by saving listener");
            return Ok(false);
        }

        let saved = if self.exists {
            self.perform_update().await?
        } else {
            self.perform_insert().await?
        };

        if saved {
            self.fire(ModelEvent::Saved);
            self.sync_original();
        }
        Ok(saved)
    }

    async fn perform_update(&mut self) -> Result<bool> {
        if self.get_dirty().is_empty() {
            return Ok(true);
        }
        if self.fire(ModelEvent::Updating) == Some(false) {
            return Ok(false);
        }

        let dirty = self.get_dirty();
        match self.self_url.clone() {
            Some(url) => {
                let mut body = self.original.clone();
                body.extend(dirty);
                mason::strip_meta_map(&mut body);
                self.registry
                    .client()
                    .update(&url, RequestOptions::with_json(Value::Object(body)))
                    .await?;
            }
            None => {
                self.keyed_query()?.base().update(dirty).await?;
            }
        }
        debug!(model = %self.name(), "Model updated");

        self.fire(ModelEvent::Updated);
        Ok(true)
    }

    async fn perform_insert(&mut self) -> Result<bool> {
        if self.fire(ModelEvent::Creating) == Some(false) {
            return Ok(false);
        }

        let query = self.query_without_scopes();
        let attributes = self.attributes.clone();

        if self.schema.inserts_collection() {
            let mut created = query.insert_collection(attributes).await?.into_iter();
            if let Some(first) = created.next() {
                self.adopt(first);
            }
            self.batch = created.collect();
        } else {
            match self.schema.key_name().filter(|_| self.schema.is_incrementing()) {
                Some(key) => {
                    let id = query.base().insert_get_id(attributes, key).await?;
                    self.attributes.insert(key.to_string(), id.into());
                }
                None => query.base().insert(attributes).await?,
            }
        }

        self.exists = true;
        debug!(model = %self.name(), id = ?self.key(), "Model created");

        self.fire(ModelEvent::Created);
        Ok(true)
    }

    /// Take over the state of a freshly created copy of this resource.
    fn adopt(&mut self, created: Model) {
        self.attributes = created.attributes;
        self.relations = created.relations;
        if created.self_url.is_some() {
            self.self_url = created.self_url;
        }
    }

    /// Fill and save. A model that does not exist yet is left alone.
    pub async fn update(&mut self, attributes: Map<String, Value>) -> Result<bool> {
        if !self.exists {
            return Ok(false);
        }
        self.fill(attributes)?;
        self.save().await
    }

    /// Delete the remote resource. Returns `false` if the model does not
    /// exist or a listener cancelled.
    pub async fn delete(&mut self) -> Result<bool> {
        if self.schema.key_name().is_none() {
            return Err(Error::MissingPrimaryKey(self.name().to_string()));
        }
        if !self.exists {
            return Ok(false);
        }
        if self.fire(ModelEvent::Deleting) == Some(false) {
            return Ok(false);
        }

        match self.self_url.clone() {
            Some(url) => {
                self.registry.client().delete(&url, RequestOptions::default()).await?;
            }
            None => {
                self.keyed_query()?.base().delete().await?;
            }
        }

        self.exists = false;
        debug!(model = %self.name(), id = ?self.key(), "Model deleted");

        self.fire(ModelEvent::Deleted);
        Ok(true)
    }

    /// Reload this record from the service.
    pub async fn fresh(&self) -> Result<Option<Model>> {
        if !self.exists {
            return Ok(None);
        }
        let key = self
            .schema
            .key_name()
            .ok_or_else(|| Error::MissingPrimaryKey(self.name().to_string()))?;
        let value = self.attributes.get(key).cloned().unwrap_or(Value::Null);
        self.query().where_eq(key, value)?.first().await
    }
}

fn invalid_date(key: &str, message: String) -> Error {
    Error::InvalidDate {
        key: key.to_string(),
        message,
    }
}

/// Equal values, or numerically equal numbers and numeric strings.
fn equivalent(current: &Value, original: &Value) -> bool {
    if current == original {
        return true;
    }

    let (Some(a), Some(b)) = (as_number(current), as_number(original)) else {
        return false;
    };
    match (integral(current), integral(original)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => numeric(s),
        _ => None,
    }
}

fn integral(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

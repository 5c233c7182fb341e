//! Single-service inheritance.
//!
//! Several model types share one service path and are told apart by a
//! discriminator attribute (`type` on `/events`, for example). A base schema
//! lists its subclasses; at boot the registry walks those lists into a
//! discriminator → schema map. Queries through a schema are scoped to the
//! discriminators it can hydrate, and each row is built as the subtype its
//! discriminator names.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::eloquent::{Model, ModelSchema, Registry, Scope};
use crate::error::{Error, Result};
use crate::mason;
use crate::query::{scalar, PathParams, QueryBuilder, Where};

/// What to do with attributes outside a subtype's allowlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidAttributePolicy {
    /// Fail with [`Error::InvalidAttributes`].
    Reject,
    /// Silently leave them out.
    #[default]
    Drop,
}

/// Single-service settings of one schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleService {
    type_field: String,
    own_type: Option<String>,
    subclasses: Vec<String>,
    persisted: Vec<String>,
    policy: InvalidAttributePolicy,
}

impl Default for SingleService {
    fn default() -> Self {
        Self::new("type")
    }
}

impl SingleService {
    pub fn new(type_field: impl Into<String>) -> Self {
        Self {
            type_field: type_field.into(),
            own_type: None,
            subclasses: Vec::new(),
            persisted: Vec::new(),
            policy: InvalidAttributePolicy::default(),
        }
    }

    /// Settings a subtype starts from.
    pub(crate) fn inherited(&self) -> Self {
        Self {
            type_field: self.type_field.clone(),
            own_type: None,
            subclasses: Vec::new(),
            persisted: Vec::new(),
            policy: self.policy,
        }
    }

    pub fn service_type(mut self, value: impl Into<String>) -> Self {
        self.own_type = Some(value.into());
        self
    }

    pub fn subclasses<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.subclasses = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn persisted<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        self.persisted = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn policy(mut self, policy: InvalidAttributePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn type_field(&self) -> &str {
        &self.type_field
    }

    pub fn own_type(&self) -> Option<&str> {
        self.own_type.as_deref()
    }

    pub fn subclass_names(&self) -> &[String] {
        &self.subclasses
    }

    pub fn persisted_keys(&self) -> &[String] {
        &self.persisted
    }

    pub fn invalid_attribute_policy(&self) -> InvalidAttributePolicy {
        self.policy
    }
}

/// Boot-time data derived from the whole catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Resolved {
    /// Discriminator → schema name, over the schema and all its subclasses.
    pub type_map: BTreeMap<String, String>,
    /// Own persisted keys followed by every ancestor's.
    pub persisted: Vec<String>,
}

/// Resolve every single-service schema in the catalog.
pub(crate) fn resolve(schemas: &BTreeMap<String, ModelSchema>) -> Result<BTreeMap<String, Resolved>> {
    let mut resolved = BTreeMap::new();

    for (name, schema) in schemas {
        let Some(settings) = schema.single_service_settings() else {
            continue;
        };

        let mut type_map = BTreeMap::new();
        collect_types(name, settings.type_field(), schemas, &mut Vec::new(), &mut type_map)?;

        let persisted = accumulate_persisted(name, schemas)?;
        debug!(model = %name, types = type_map.len(), "Resolved single-service schema");

        resolved.insert(name.clone(), Resolved { type_map, persisted });
    }

    Ok(resolved)
}

fn collect_types(
    name: &str,
    type_field: &str,
    schemas: &BTreeMap<String, ModelSchema>,
    stack: &mut Vec<String>,
    type_map: &mut BTreeMap<String, String>,
) -> Result<()> {
    if stack.iter().any(|seen| seen == name) {
        stack.push(name.to_string());
        return Err(Error::Boot(format!("subclass cycle: {}", stack.join(" -> "))));
    }

    let schema = schemas
        .get(name)
        .ok_or_else(|| Error::Boot(format!("unknown subclass [{name}]")))?;
    let settings = schema.single_service_settings().ok_or_else(|| {
        Error::Boot(format!("[{name}] is listed as a subclass but has no single-service settings"))
    })?;
    if settings.type_field() != type_field {
        return Err(Error::Boot(format!(
            "[{name}] discriminates on [{}] but its base uses [{type_field}]",
            settings.type_field()
        )));
    }

    if let Some(own) = settings.own_type() {
        match type_map.get(own) {
            Some(owner) if owner != name => {
                return Err(Error::Boot(format!(
                    "discriminator [{own}] is claimed by both [{owner}] and [{name}]"
                )));
            }
            _ => {
                type_map.insert(own.to_string(), name.to_string());
            }
        }
    }

    stack.push(name.to_string());
    for subclass in settings.subclass_names() {
        collect_types(subclass, type_field, schemas, stack, type_map)?;
    }
    stack.pop();

    Ok(())
}

fn accumulate_persisted(name: &str, schemas: &BTreeMap<String, ModelSchema>) -> Result<Vec<String>> {
    let mut persisted = Vec::new();
    let mut visited = BTreeSet::new();
    let mut current = Some(name);

    while let Some(name) = current {
        if !visited.insert(name) {
            return Err(Error::Boot(format!("parent cycle through [{name}]")));
        }
        let Some(schema) = schemas.get(name) else {
            return Err(Error::Boot(format!("unknown parent [{name}]")));
        };
        match schema.single_service_settings() {
            Some(settings) => persisted.extend(settings.persisted_keys().iter().cloned()),
            None => break,
        }
        current = schema.parent();
    }

    Ok(persisted)
}

/// Discriminators a schema's queries are scoped to.
pub fn service_types(schema: &ModelSchema) -> Vec<String> {
    schema
        .resolved
        .as_ref()
        .map(|resolved| resolved.type_map.keys().cloned().collect())
        .unwrap_or_default()
}

/// Effective allowlist of a schema: empty when neither the schema nor its
/// ancestors declare persisted keys, otherwise those keys plus the primary
/// key, the discriminator, the dates and the relation names.
pub fn persisted_attributes(schema: &ModelSchema) -> Vec<String> {
    let Some(settings) = schema.single_service_settings() else {
        return Vec::new();
    };
    let declared = match &schema.resolved {
        Some(resolved) => resolved.persisted.clone(),
        None => settings.persisted_keys().to_vec(),
    };
    if declared.is_empty() {
        return Vec::new();
    }

    let mut keys: Vec<String> = Vec::new();
    let candidates = schema
        .key_name()
        .into_iter()
        .map(str::to_string)
        .chain(std::iter::once(settings.type_field().to_string()))
        .chain(declared)
        .chain(schema.date_keys().iter().cloned())
        .chain(schema.relations().keys().cloned());
    for key in candidates {
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

/// Build the subtype named by a row's discriminator.
pub(crate) fn new_from_builder(
    registry: &Registry,
    schema: &ModelSchema,
    row: Map<String, Value>,
    path_params: &PathParams,
) -> Result<Model> {
    let type_field = schema
        .single_service_settings()
        .map(|settings| settings.type_field().to_string())
        .unwrap_or_else(|| "type".to_string());

    let discriminator = row.get(&type_field).map(scalar).unwrap_or_default();
    let target = schema
        .resolved
        .as_ref()
        .and_then(|resolved| resolved.type_map.get(&discriminator))
        .ok_or_else(|| Error::UnrecognizedType {
            field: type_field.clone(),
            value: discriminator.clone(),
        })?;

    let target = registry.schema(target)?;
    let mut model = Model::blank(registry.clone(), target, path_params.clone());
    model.set_exists(true);
    set_filtered_attributes(&mut model, row)?;
    Ok(model)
}

/// Hydrate `row` into `model`, keeping meta-properties and allowlisted keys.
pub(crate) fn set_filtered_attributes(model: &mut Model, mut row: Map<String, Value>) -> Result<()> {
    let schema = Arc::clone(model.schema());
    let allowed = persisted_attributes(&schema);

    if !allowed.is_empty() {
        let extras: Vec<String> = row
            .iter()
            .filter(|(key, value)| {
                !mason::is_meta_key(key) && !allowed.contains(key) && !value.is_null()
            })
            .map(|(key, _)| key.clone())
            .collect();

        if !extras.is_empty() && policy(&schema) == InvalidAttributePolicy::Reject {
            return Err(Error::InvalidAttributes {
                model: schema.name().to_string(),
                attributes: extras,
            });
        }

        row.retain(|key, _| mason::is_meta_key(key) || allowed.contains(key));
    }

    model.set_raw_attributes(row, true)
}

/// Stamp the discriminator and enforce the allowlist before a save.
pub(crate) fn prepare_for_save(model: &mut Model) -> Result<()> {
    let schema = Arc::clone(model.schema());
    let Some(settings) = schema.single_service_settings() else {
        return Ok(());
    };

    let own_type = settings.own_type().ok_or_else(|| {
        Error::InvalidArgument(format!(
            "cannot save [{}]: it declares no service type",
            schema.name()
        ))
    })?;
    model
        .attributes_mut()
        .insert(settings.type_field().to_string(), Value::String(own_type.to_string()));

    let allowed = persisted_attributes(&schema);
    if allowed.is_empty() {
        return Ok(());
    }

    let extras: Vec<String> = model
        .attributes()
        .keys()
        .filter(|key| !allowed.contains(key))
        .cloned()
        .collect();
    if extras.is_empty() {
        return Ok(());
    }

    match settings.invalid_attribute_policy() {
        InvalidAttributePolicy::Reject => Err(Error::InvalidAttributes {
            model: schema.name().to_string(),
            attributes: extras,
        }),
        InvalidAttributePolicy::Drop => {
            debug!(model = %schema.name(), dropped = ?extras, "Dropping unpersisted attributes");
            model.attributes_mut().retain(|key, _| allowed.contains(key));
            Ok(())
        }
    }
}

fn policy(schema: &ModelSchema) -> InvalidAttributePolicy {
    schema
        .single_service_settings()
        .map(SingleService::invalid_attribute_policy)
        .unwrap_or_default()
}

/// Global scope restricting a query to the discriminators its schema hydrates.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleServiceScope;

impl SingleServiceScope {
    pub const NAME: &'static str = "single_service";
}

impl Scope for SingleServiceScope {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&self, query: QueryBuilder, schema: &ModelSchema) -> QueryBuilder {
        let types = service_types(schema);
        match schema.single_service_settings() {
            Some(settings) if !types.is_empty() => query.where_in(settings.type_field(), types),
            _ => query,
        }
    }

    fn remove(&self, query: &mut QueryBuilder, schema: &ModelSchema) {
        let Some(settings) = schema.single_service_settings() else {
            return;
        };
        // The scope's clause is the first `in` filter on the discriminator
        // carrying exactly the schema's types; later ones belong to the caller.
        let field = settings.type_field();
        let types: Vec<Value> = service_types(schema).into_iter().map(Value::String).collect();
        let mut removed = false;
        query.retain_wheres(|clause| {
            let ours = !removed
                && matches!(clause, Where::In { column, values } if column == field && *values == types);
            removed |= ours;
            !ours
        });
    }
}

//! Model declarations.
//!
//! A [`ModelSchema`] is everything a model type declares up front: where it
//! lives, how mass assignment is guarded, how attributes are cast and
//! serialized, which embedded attributes hydrate into related models, and
//! optionally how it takes part in single-service inheritance.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Error;
use crate::ssi::{InvalidAttributePolicy, Resolved, SingleService};

/// Transform applied when an attribute is read.
pub type GetMutator = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Transform applied when an attribute is written; returns the stored value.
pub type SetMutator = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Declared attribute casts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastType {
    Int,
    Float,
    String,
    Bool,
    Array,
    Json,
    Object,
    Collection,
}

impl CastType {
    /// JSON casts are stored encoded and decoded on read.
    pub fn is_json(&self) -> bool {
        matches!(
            self,
            CastType::Array | CastType::Json | CastType::Object | CastType::Collection
        )
    }

    /// Convert a stored value. Null stays null.
    pub fn apply(&self, value: &Value) -> Value {
        if value.is_null() {
            return Value::Null;
        }

        match self {
            CastType::Int => Value::from(to_f64(value).map(|f| f as i64).unwrap_or(0)),
            CastType::Float => to_f64(value)
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::from(0)),
            CastType::String => Value::String(match value {
                Value::String(s) => s.clone(),
                Value::Bool(true) => "1".to_string(),
                Value::Bool(false) => String::new(),
                other => other.to_string(),
            }),
            CastType::Bool => Value::Bool(truthy(value)),
            CastType::Array | CastType::Json | CastType::Object | CastType::Collection => match value {
                Value::String(s) => serde_json::from_str(s).unwrap_or(Value::Null),
                other => other.clone(),
            },
        }
    }
}

impl FromStr for CastType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" => Ok(CastType::Int),
            "real" | "float" | "double" => Ok(CastType::Float),
            "string" => Ok(CastType::String),
            "bool" | "boolean" => Ok(CastType::Bool),
            "array" => Ok(CastType::Array),
            "json" => Ok(CastType::Json),
            "object" => Ok(CastType::Object),
            "collection" => Ok(CastType::Collection),
            other => Err(Error::InvalidArgument(format!("unknown cast type [{other}]"))),
        }
    }
}

/// Numeric reading of a value, accepting numeric strings and booleans.
pub(crate) fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => numeric(s),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Parse a numeric string. Words like `inf` or `NaN` are not numbers here.
pub(crate) fn numeric(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty()
        || !s
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
    {
        return None;
    }
    s.parse::<f64>().ok().filter(|f| f.is_finite())
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// How date attributes are stored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DateFormat {
    /// Unix timestamp in seconds.
    #[default]
    Unix,
    /// A chrono `strftime` pattern.
    Pattern(String),
}

/// An embedded attribute that hydrates into related models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    /// Name of the related model's schema.
    pub target: String,
    /// A list of models rather than one.
    pub many: bool,
}

/// Declaration of one model type.
#[derive(Clone)]
pub struct ModelSchema {
    name: String,
    path: String,
    primary_key: Option<String>,
    incrementing: bool,
    insert_returns_collection: bool,
    fillable: Vec<String>,
    guarded: Vec<String>,
    hidden: Vec<String>,
    visible: Vec<String>,
    casts: BTreeMap<String, CastType>,
    dates: Vec<String>,
    date_format: DateFormat,
    relations: BTreeMap<String, RelationDef>,
    get_mutators: BTreeMap<String, GetMutator>,
    set_mutators: BTreeMap<String, SetMutator>,
    single_service: Option<SingleService>,
    parent: Option<String>,
    pub(crate) resolved: Option<Resolved>,
}

impl fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSchema")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("primary_key", &self.primary_key)
            .field("single_service", &self.single_service)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

impl ModelSchema {
    /// A model named `name` served at `path`, keyed by an incrementing `id`.
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            primary_key: Some("id".to_string()),
            incrementing: true,
            insert_returns_collection: false,
            fillable: Vec::new(),
            guarded: Vec::new(),
            hidden: Vec::new(),
            visible: Vec::new(),
            casts: BTreeMap::new(),
            dates: Vec::new(),
            date_format: DateFormat::default(),
            relations: BTreeMap::new(),
            get_mutators: BTreeMap::new(),
            set_mutators: BTreeMap::new(),
            single_service: None,
            parent: None,
            resolved: None,
        }
    }

    /// A subtype of `parent`: same path and attribute handling, with its own
    /// name. Single-service settings keep the discriminator field and policy
    /// but not the parent's own type, subclasses or persisted list.
    pub fn extend(parent: &ModelSchema, name: impl Into<String>) -> Self {
        let mut schema = parent.clone();
        schema.name = name.into();
        schema.parent = Some(parent.name.clone());
        schema.resolved = None;
        schema.single_service = parent
            .single_service
            .as_ref()
            .map(SingleService::inherited);
        schema
    }

    pub fn primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = Some(key.into());
        self
    }

    pub fn without_primary_key(mut self) -> Self {
        self.primary_key = None;
        self
    }

    pub fn incrementing(mut self, incrementing: bool) -> Self {
        self.incrementing = incrementing;
        self
    }

    /// Creating one resource answers with a collection of them.
    pub fn insert_returns_collection(mut self, value: bool) -> Self {
        self.insert_returns_collection = value;
        self
    }

    pub fn fillable<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        self.fillable = keys.into_iter().map(Into::into).collect();
        self
    }

    /// `["*"]` guards everything.
    pub fn guarded<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        self.guarded = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn hidden<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        self.hidden = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn visible<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        self.visible = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn cast(mut self, key: impl Into<String>, cast: CastType) -> Self {
        self.casts.insert(key.into(), cast);
        self
    }

    pub fn dates<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        self.dates = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn date_format(mut self, format: DateFormat) -> Self {
        self.date_format = format;
        self
    }

    /// Embedded attribute `name` hydrates into one `target` model.
    pub fn has_one(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relations.insert(
            name.into(),
            RelationDef {
                target: target.into(),
                many: false,
            },
        );
        self
    }

    /// Embedded attribute `name` hydrates into a list of `target` models.
    pub fn has_many(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relations.insert(
            name.into(),
            RelationDef {
                target: target.into(),
                many: true,
            },
        );
        self
    }

    pub fn get_mutator<F>(mut self, key: impl Into<String>, mutator: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.get_mutators.insert(key.into(), Arc::new(mutator));
        self
    }

    pub fn set_mutator<F>(mut self, key: impl Into<String>, mutator: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.set_mutators.insert(key.into(), Arc::new(mutator));
        self
    }

    /// Take part in single-service inheritance.
    pub fn single_service(mut self, settings: SingleService) -> Self {
        self.single_service = Some(settings);
        self
    }

    /// Discriminator value owned by this schema.
    pub fn service_type(self, value: impl Into<String>) -> Self {
        let value = value.into();
        self.map_single_service(|ss| ss.service_type(value))
    }

    /// Schemas whose discriminators this schema's queries also return.
    pub fn subclasses<S: Into<String>>(self, names: impl IntoIterator<Item = S>) -> Self {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        self.map_single_service(|ss| ss.subclasses(names))
    }

    /// Attribute allowlist, added to whatever the parent allows.
    pub fn persisted<S: Into<String>>(self, keys: impl IntoIterator<Item = S>) -> Self {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        self.map_single_service(|ss| ss.persisted(keys))
    }

    pub fn invalid_attributes(self, policy: InvalidAttributePolicy) -> Self {
        self.map_single_service(|ss| ss.policy(policy))
    }

    fn map_single_service(mut self, f: impl FnOnce(SingleService) -> SingleService) -> Self {
        let current = self.single_service.take().unwrap_or_default();
        self.single_service = Some(f(current));
        self
    }

    // --- accessors ---

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn key_name(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    pub fn is_incrementing(&self) -> bool {
        self.incrementing
    }

    pub fn inserts_collection(&self) -> bool {
        self.insert_returns_collection
    }

    pub fn fillable_keys(&self) -> &[String] {
        &self.fillable
    }

    pub fn guarded_keys(&self) -> &[String] {
        &self.guarded
    }

    pub fn hidden_keys(&self) -> &[String] {
        &self.hidden
    }

    pub fn visible_keys(&self) -> &[String] {
        &self.visible
    }

    pub fn cast_type(&self, key: &str) -> Option<CastType> {
        self.casts.get(key).copied()
    }

    pub fn casts(&self) -> &BTreeMap<String, CastType> {
        &self.casts
    }

    pub fn date_keys(&self) -> &[String] {
        &self.dates
    }

    pub fn is_date(&self, key: &str) -> bool {
        self.dates.iter().any(|d| d == key)
    }

    pub fn get_date_format(&self) -> &DateFormat {
        &self.date_format
    }

    pub fn relations(&self) -> &BTreeMap<String, RelationDef> {
        &self.relations
    }

    pub(crate) fn getter(&self, key: &str) -> Option<&GetMutator> {
        self.get_mutators.get(key)
    }

    pub(crate) fn setter(&self, key: &str) -> Option<&SetMutator> {
        self.set_mutators.get(key)
    }

    /// Attributes with a read mutator.
    pub fn mutated_attributes(&self) -> impl Iterator<Item = &str> {
        self.get_mutators.keys().map(String::as_str)
    }

    pub fn single_service_settings(&self) -> Option<&SingleService> {
        self.single_service.as_ref()
    }

    pub fn is_single_service(&self) -> bool {
        self.single_service.is_some()
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Keep only the arrayable entries: the visible ones when a visible list
    /// is declared, otherwise everything not hidden.
    pub(crate) fn is_arrayable(&self, key: &str) -> bool {
        if !self.visible.is_empty() {
            return self.visible.iter().any(|v| v == key);
        }
        !self.hidden.iter().any(|h| h == key)
    }
}

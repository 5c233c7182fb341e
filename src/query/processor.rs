//! Response processor: Mason envelopes in, builder return shapes out.

use std::fmt;

use serde_json::Value;

/// Extracts results from raw API documents.
pub trait Processor: Send + Sync {
    /// Items of a collection envelope. Never fails: anything without an
    /// `items` list yields no rows.
    fn process_select(&self, response: Value) -> Vec<Value>;

    /// The `total` reported by a collection envelope, coerced to an integer.
    fn process_count(&self, response: &Value) -> u64 {
        self.process_total(response).unwrap_or(0)
    }

    /// The `total` reported by a collection envelope, if any.
    fn process_total(&self, response: &Value) -> Option<u64>;

    /// The id under `key` of a freshly created resource.
    fn process_insert_get_id(&self, response: &Value, key: &str) -> Option<ResourceId>;
}

/// Default processor for Mason collection envelopes.
#[derive(Debug, Clone, Copy, Default)]
pub struct MasonProcessor;

impl Processor for MasonProcessor {
    fn process_select(&self, response: Value) -> Vec<Value> {
        match response {
            Value::Object(mut map) => match map.remove("items") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    fn process_total(&self, response: &Value) -> Option<u64> {
        match response.get("total")? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn process_insert_get_id(&self, response: &Value, key: &str) -> Option<ResourceId> {
        ResourceId::from_value(response.get(key)?)
    }
}

/// A primary key: numeric when the service sent an integer, or a string that
/// reads back unchanged as one; opaque otherwise, so `"007"` stays `"007"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceId {
    Int(i64),
    Str(String),
}

impl ResourceId {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(match n.as_i64() {
                Some(id) => ResourceId::Int(id),
                None => ResourceId::Str(n.to_string()),
            }),
            Value::String(s) => Some(match s.parse::<i64>() {
                Ok(id) if id.to_string() == *s => ResourceId::Int(id),
                _ => ResourceId::Str(s.clone()),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Int(id) => write!(f, "{id}"),
            ResourceId::Str(id) => f.write_str(id),
        }
    }
}

impl From<ResourceId> for Value {
    fn from(id: ResourceId) -> Self {
        match id {
            ResourceId::Int(id) => Value::from(id),
            ResourceId::Str(id) => Value::String(id),
        }
    }
}

impl From<i64> for ResourceId {
    fn from(id: i64) -> Self {
        ResourceId::Int(id)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        ResourceId::Str(id.to_string())
    }
}

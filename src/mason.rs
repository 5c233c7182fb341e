//! Mason hypermedia document helpers.
//!
//! Mason documents carry plain data alongside `@`-prefixed meta-properties
//! (`@controls`, `@error`, `@meta`, ...). Models never expose the latter.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Media type every API response must carry.
pub const MEDIA_TYPE: &str = "application/vnd.mason+json";

/// Meta-property holding links and actions.
pub const CONTROLS: &str = "@controls";

/// Meta-property holding error details.
pub const ERROR: &str = "@error";

/// Returns true for Mason meta-property names.
pub fn is_meta_key(key: &str) -> bool {
    key.starts_with('@')
}

/// Returns true if a `Content-Type` header value denotes a Mason document.
pub fn is_mason_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|media| media.trim().eq_ignore_ascii_case(MEDIA_TYPE))
        .unwrap_or(false)
}

/// The `@controls.self.href` link of a document, if present and non-empty.
pub fn self_href(document: &Value) -> Option<&str> {
    document
        .get(CONTROLS)?
        .get("self")?
        .get("href")?
        .as_str()
        .filter(|href| !href.is_empty())
}

/// Remove every meta-property, recursively through nested objects and arrays.
pub fn strip_meta(value: &mut Value) {
    match value {
        Value::Object(map) => strip_meta_map(map),
        Value::Array(items) => items.iter_mut().for_each(strip_meta),
        _ => {}
    }
}

/// [`strip_meta`] for a bare object map.
pub fn strip_meta_map(map: &mut Map<String, Value>) {
    map.retain(|key, _| !is_meta_key(key));
    map.values_mut().for_each(strip_meta);
}

/// Field messages of a 422 error envelope (`@error.fields`).
pub fn error_fields(document: &Value) -> BTreeMap<String, Value> {
    document
        .get(ERROR)
        .and_then(|error| error.get("fields"))
        .and_then(Value::as_object)
        .map(|fields| {
            fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
}

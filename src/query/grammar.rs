//! Query grammar: builder state in, URL and request options out.
//!
//! Everything here is pure. Wire encoding:
//! - `filter[<column>]=<op>[:<value>]`, list values comma-joined
//! - `filter[<column>][]=...` for every constraint on a column filtered more than once
//! - `filter[<column>]=in:<v1>,<v2>` for `where_in`
//! - `sort[<column>]=asc|desc`
//! - `limit=<n>`, `offset=<n>`

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::{PathParams, QueryBuilder, Where};
use crate::error::{Error, Result};
use crate::mason;
use crate::transport::RequestOptions;

/// Compiles builder state into requests.
pub trait Grammar: Send + Sync {
    /// Substitute `{name}` and `{name:pattern}` placeholders. Placeholders
    /// without a matching parameter are left as they are.
    fn compile_url(&self, template: &str, params: &PathParams) -> String {
        substitute(template, params)
    }

    fn compile_select(&self, query: &QueryBuilder) -> (String, RequestOptions);

    fn compile_insert(&self, query: &QueryBuilder, row: &Map<String, Value>) -> (String, RequestOptions) {
        let url = self.compile_url(query.path(), query.path_params());
        (url, RequestOptions::with_json(Value::Object(row.clone())))
    }

    fn compile_insert_get_id(&self, query: &QueryBuilder, row: &Map<String, Value>) -> (String, RequestOptions) {
        self.compile_insert(query, row)
    }

    /// PUT target and body for one already-fetched record: its self link,
    /// and the record stripped of meta-properties with `values` merged over it.
    fn compile_update(&self, existing: &Value, values: &Map<String, Value>) -> Result<(String, RequestOptions)>;

    /// DELETE target for one already-fetched record: its self link.
    fn compile_delete(&self, existing: &Value) -> Result<(String, RequestOptions)>;
}

/// Grammar for the Mason API.
#[derive(Debug, Clone, Copy, Default)]
pub struct MasonGrammar;

impl Grammar for MasonGrammar {
    fn compile_select(&self, query: &QueryBuilder) -> (String, RequestOptions) {
        let url = self.compile_url(query.path(), query.path_params());

        let mut params = compile_wheres(query.wheres());
        params.extend(
            query
                .orders()
                .iter()
                .map(|order| (format!("sort[{}]", order.column), order.direction.as_str().to_string())),
        );
        if let Some(limit) = query.get_limit() {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = query.get_offset() {
            params.push(("offset".to_string(), offset.to_string()));
        }

        (
            url,
            RequestOptions {
                query: params,
                json: None,
            },
        )
    }

    fn compile_update(&self, existing: &Value, values: &Map<String, Value>) -> Result<(String, RequestOptions)> {
        let url = require_self_href(existing)?;

        let mut body = match existing {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        mason::strip_meta_map(&mut body);
        for (key, value) in values {
            body.insert(key.clone(), value.clone());
        }

        Ok((url, RequestOptions::with_json(Value::Object(body))))
    }

    fn compile_delete(&self, existing: &Value) -> Result<(String, RequestOptions)> {
        Ok((require_self_href(existing)?, RequestOptions::default()))
    }
}

fn require_self_href(existing: &Value) -> Result<String> {
    mason::self_href(existing)
        .map(str::to_string)
        .ok_or_else(|| Error::Protocol {
            snippet: "record has no @controls.self.href".to_string(),
        })
}

fn compile_wheres(wheres: &[Where]) -> Vec<(String, String)> {
    let mut occurrences: BTreeMap<&str, usize> = BTreeMap::new();
    for clause in wheres {
        *occurrences.entry(clause.column()).or_default() += 1;
    }

    wheres
        .iter()
        .map(|clause| {
            let column = clause.column();
            let key = if occurrences.get(column).copied().unwrap_or(0) > 1 {
                format!("filter[{column}][]")
            } else {
                format!("filter[{column}]")
            };

            let value = match clause {
                Where::Basic { operator, value: None, .. } => operator.as_str().to_string(),
                Where::Basic {
                    operator,
                    value: Some(value),
                    ..
                } => format!("{}:{}", operator, operand(value)),
                Where::In { values, .. } => format!("in:{}", join(values)),
            };

            (key, value)
        })
        .collect()
}

fn operand(value: &Value) -> String {
    match value {
        Value::Array(items) => join(items),
        other => scalar(other),
    }
}

fn join(values: &[Value]) -> String {
    values.iter().map(scalar).collect::<Vec<_>>().join(",")
}

/// Plain text form of a JSON value: strings unquoted.
pub(crate) fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn substitute(template: &str, params: &PathParams) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        // Patterns may contain braces themselves, e.g. `{id:[0-9]{3}}`.
        let mut depth = 0usize;
        let mut end = None;
        for (i, c) in tail.char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }

        let Some(end) = end else {
            out.push_str(tail);
            return out;
        };

        let placeholder = &tail[..=end];
        let inner = &tail[1..end];
        let name = inner.split(':').next().unwrap_or(inner).trim();

        match params.get(name) {
            Some(value) => out.push_str(&scalar(value)),
            None => out.push_str(placeholder),
        }
        rest = &tail[end + 1..];
    }

    out.push_str(rest);
    out
}

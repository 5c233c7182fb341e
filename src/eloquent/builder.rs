//! Model-aware query builder.
//!
//! [`ModelQuery`] wraps a [`QueryBuilder`] for one schema: clause methods are
//! forwarded explicitly, terminal operations hydrate rows into [`Model`]s.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::{Model, ModelSchema, Registry, Scope};
use crate::error::{Error, Result};
use crate::query::{scalar, Direction, InsertRows, Operator, QueryBuilder, ResourceId};
use crate::transport::RequestOptions;

/// A query whose results are models of one schema.
#[derive(Clone)]
pub struct ModelQuery {
    registry: Registry,
    schema: Arc<ModelSchema>,
    query: QueryBuilder,
    scopes: Vec<Arc<dyn Scope>>,
}

impl fmt::Debug for ModelQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelQuery")
            .field("model", &self.schema.name())
            .field("query", &self.query)
            .field("scopes", &self.scopes.iter().map(|s| s.name().to_string()).collect::<Vec<_>>())
            .finish()
    }
}

impl ModelQuery {
    pub(crate) fn new(
        registry: Registry,
        schema: Arc<ModelSchema>,
        query: QueryBuilder,
        scopes: Vec<Arc<dyn Scope>>,
    ) -> Self {
        let query = scopes
            .iter()
            .fold(query, |query, scope| scope.apply(query, &schema));
        Self {
            registry,
            schema,
            query,
            scopes,
        }
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    /// The underlying query builder.
    pub fn base(&self) -> &QueryBuilder {
        &self.query
    }

    pub fn into_base(self) -> QueryBuilder {
        self.query
    }

    /// Names of the global scopes still applied.
    pub fn scopes(&self) -> Vec<&str> {
        self.scopes.iter().map(|scope| scope.name()).collect()
    }

    /// Take one global scope back out, leaving every other clause alone.
    pub fn without_scope(mut self, name: &str) -> Self {
        let schema = Arc::clone(&self.schema);
        let query = &mut self.query;
        self.scopes.retain(|scope| {
            if scope.name() == name {
                scope.remove(query, &schema);
                false
            } else {
                true
            }
        });
        self
    }

    pub fn without_global_scopes(mut self) -> Self {
        for scope in std::mem::take(&mut self.scopes) {
            scope.remove(&mut self.query, &self.schema);
        }
        self
    }

    fn map(mut self, f: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        self.query = f(self.query);
        self
    }

    fn try_map(mut self, f: impl FnOnce(QueryBuilder) -> Result<QueryBuilder>) -> Result<Self> {
        self.query = f(self.query)?;
        Ok(self)
    }

    // --- clauses ---

    pub fn with_path_param(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.map(|q| q.with_path_param(name, value))
    }

    pub fn filter(self, column: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Result<Self> {
        self.try_map(|q| q.filter(column, operator, value))
    }

    pub fn where_op(self, column: impl Into<String>, operator: &str, value: impl Into<Value>) -> Result<Self> {
        self.try_map(|q| q.where_op(column, operator, value))
    }

    pub fn where_eq(self, column: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        self.try_map(|q| q.where_eq(column, value))
    }

    pub fn where_all<K, V>(self, pairs: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.try_map(|q| q.where_all(pairs))
    }

    pub fn where_empty(self, column: impl Into<String>) -> Self {
        self.map(|q| q.where_empty(column))
    }

    pub fn where_not_empty(self, column: impl Into<String>) -> Self {
        self.map(|q| q.where_not_empty(column))
    }

    pub fn where_between(self, column: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Result<Self> {
        self.try_map(|q| q.where_between(column, low, high))
    }

    pub fn where_not_between(
        self,
        column: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Result<Self> {
        self.try_map(|q| q.where_not_between(column, low, high))
    }

    pub fn where_in<V: Into<Value>>(self, column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.map(|q| q.where_in(column, values))
    }

    pub fn order_by(self, column: impl Into<String>, direction: impl Into<Direction>) -> Self {
        self.map(|q| q.order_by(column, direction))
    }

    pub fn limit(self, value: i64) -> Self {
        self.map(|q| q.limit(value))
    }

    pub fn take(self, value: i64) -> Self {
        self.limit(value)
    }

    pub fn offset(self, value: i64) -> Self {
        self.map(|q| q.offset(value))
    }

    pub fn skip(self, value: i64) -> Self {
        self.offset(value)
    }

    pub fn for_page(self, page: u64, per_page: u64) -> Self {
        self.map(|q| q.for_page(page, per_page))
    }

    // --- terminals ---

    pub fn compile(&self) -> (String, RequestOptions) {
        self.query.compile()
    }

    fn key_name(&self) -> &str {
        self.schema.key_name().unwrap_or("id")
    }

    /// Build models from raw rows, each as the schema (or subtype) it belongs to.
    pub fn hydrate(&self, rows: Vec<Value>) -> Result<Vec<Model>> {
        rows.into_iter()
            .map(|row| Model::from_row(&self.registry, Arc::clone(&self.schema), row, self.query.path_params()))
            .collect()
    }

    pub async fn get(&self) -> Result<Vec<Model>> {
        self.hydrate(self.query.get().await?)
    }

    pub async fn get_with_total(&self) -> Result<(Vec<Model>, Option<u64>)> {
        let (rows, total) = self.query.get_with_total().await?;
        Ok((self.hydrate(rows)?, total))
    }

    pub async fn first(&self) -> Result<Option<Model>> {
        Ok(self.clone().take(1).get().await?.into_iter().next())
    }

    pub async fn first_or_fail(&self) -> Result<Model> {
        self.first().await?.ok_or_else(|| Error::ModelNotFound {
            model: self.schema.name().to_string(),
            ids: Vec::new(),
        })
    }

    /// The record whose primary key is `id`.
    pub async fn find(&self, id: impl Into<Value>) -> Result<Option<Model>> {
        let key = self.key_name().to_string();
        self.clone().where_eq(key, id)?.first().await
    }

    /// Every record whose primary key is in `ids`. No ids, no request.
    pub async fn find_many(&self, ids: Vec<Value>) -> Result<Vec<Model>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let key = self.key_name().to_string();
        self.clone().where_in(key, ids).get().await
    }

    pub async fn find_or_fail(&self, id: impl Into<Value>) -> Result<Model> {
        let id = id.into();
        self.find(id.clone()).await?.ok_or_else(|| Error::ModelNotFound {
            model: self.schema.name().to_string(),
            ids: vec![id],
        })
    }

    /// Fails unless every distinct id matched a record.
    pub async fn find_many_or_fail(&self, ids: Vec<Value>) -> Result<Vec<Model>> {
        let distinct: BTreeSet<String> = ids.iter().map(scalar).collect();
        let models = self.find_many(ids.clone()).await?;
        if models.len() == distinct.len() {
            return Ok(models);
        }
        Err(Error::ModelNotFound {
            model: self.schema.name().to_string(),
            ids,
        })
    }

    /// Page through the results as models.
    pub async fn chunk<F, Fut>(&self, count: u64, mut callback: F) -> Result<()>
    where
        F: FnMut(Vec<Model>) -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let mut pending: Option<Error> = None;
        self.query
            .chunk(count, |rows| {
                let hydrated = self.hydrate(rows);
                let next = match hydrated {
                    Ok(models) => Some(callback(models)),
                    Err(err) => {
                        pending = Some(err);
                        None
                    }
                };
                async move {
                    match next {
                        Some(fut) => fut.await,
                        None => Ok(false),
                    }
                }
            })
            .await?;

        match pending {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub async fn count(&self) -> Result<u64> {
        self.query.count().await
    }

    pub async fn exists(&self) -> Result<bool> {
        self.query.exists().await
    }

    pub async fn update(&self, values: Map<String, Value>) -> Result<u64> {
        self.query.update(values).await
    }

    pub async fn delete(&self) -> Result<u64> {
        self.query.delete().await
    }

    pub async fn insert(&self, rows: impl Into<InsertRows>) -> Result<()> {
        self.query.insert(rows).await
    }

    /// POST one row and read the created primary key.
    pub async fn insert_get_id(&self, row: Map<String, Value>) -> Result<ResourceId> {
        let key = self.key_name().to_string();
        self.query.insert_get_id(row, &key).await
    }

    /// POST one row to a service answering with the created resources.
    pub async fn insert_collection(&self, row: Map<String, Value>) -> Result<Vec<Model>> {
        self.hydrate(self.query.insert_collection(row).await?)
    }
}

//! Fluent query builder.
//!
//! Clause methods consume and return the builder; terminal operations borrow
//! it, so one builder can be run several times or cloned to branch a query.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use super::{Direction, Operator, Order, PathParams, ResourceId, Where};
use crate::connection::Client;
use crate::error::{Error, Result};
use crate::transport::RequestOptions;

/// Page size used when updating or deleting by query.
pub const MUTATION_CHUNK_SIZE: u64 = 50;

/// Rows handed to [`QueryBuilder::insert`].
#[derive(Debug, Clone, PartialEq)]
pub enum InsertRows {
    /// Sent as-is.
    One(Map<String, Value>),
    /// Each row's keys are sorted before sending, one request per row.
    Many(Vec<Map<String, Value>>),
}

impl From<Map<String, Value>> for InsertRows {
    fn from(row: Map<String, Value>) -> Self {
        InsertRows::One(row)
    }
}

impl From<Vec<Map<String, Value>>> for InsertRows {
    fn from(rows: Vec<Map<String, Value>>) -> Self {
        InsertRows::Many(rows)
    }
}

/// Accumulates query criteria against one service path.
#[derive(Clone)]
pub struct QueryBuilder {
    client: Arc<Client>,
    path: String,
    path_params: PathParams,
    wheres: Vec<Where>,
    orders: Vec<Order>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("path", &self.path)
            .field("path_params", &self.path_params)
            .field("wheres", &self.wheres)
            .field("orders", &self.orders)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish()
    }
}

impl QueryBuilder {
    pub fn new(client: Arc<Client>) -> Self {
        Self {
            client,
            path: String::new(),
            path_params: PathParams::new(),
            wheres: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Target a path template and its parameters.
    pub fn from(mut self, path: impl Into<String>, params: PathParams) -> Self {
        self.path = path.into();
        self.path_params = params;
        self
    }

    /// Bind one path template parameter.
    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    /// A fresh builder against the same service, without clauses.
    pub fn new_query(&self) -> Self {
        Self::new(Arc::clone(&self.client)).from(self.path.clone(), self.path_params.clone())
    }

    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    pub fn wheres(&self) -> &[Where] {
        &self.wheres
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn get_limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn get_offset(&self) -> Option<u64> {
        self.offset
    }

    // --- clauses ---

    /// Add a filter. Fails fast when the operator needs an operand that is
    /// missing or null.
    pub fn filter(mut self, column: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Result<Self> {
        self.wheres.push(Where::basic(column, operator, Some(value.into()))?);
        Ok(self)
    }

    /// [`filter`](Self::filter) with the operator given by name.
    pub fn where_op(self, column: impl Into<String>, operator: &str, value: impl Into<Value>) -> Result<Self> {
        let operator = operator.parse()?;
        self.filter(column, operator, value)
    }

    /// Shorthand for an `eq` filter.
    pub fn where_eq(self, column: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        self.filter(column, Operator::Eq, value)
    }

    /// One `eq` filter per pair.
    pub fn where_all<K, V>(self, pairs: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        pairs
            .into_iter()
            .try_fold(self, |query, (column, value)| query.where_eq(column, value))
    }

    pub fn where_empty(mut self, column: impl Into<String>) -> Self {
        self.wheres.push(Where::Basic {
            column: column.into(),
            operator: Operator::Empty,
            value: None,
        });
        self
    }

    pub fn where_not_empty(mut self, column: impl Into<String>) -> Self {
        self.wheres.push(Where::Basic {
            column: column.into(),
            operator: Operator::NotEmpty,
            value: None,
        });
        self
    }

    pub fn where_between(self, column: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Result<Self> {
        self.filter(column, Operator::Between, Value::Array(vec![low.into(), high.into()]))
    }

    pub fn where_not_between(self, column: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Result<Self> {
        self.filter(column, Operator::NotBetween, Value::Array(vec![low.into(), high.into()]))
    }

    pub fn where_in<V: Into<Value>>(mut self, column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.wheres.push(Where::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Keep only the where clauses matching `keep`, leaving everything else as is.
    pub fn retain_wheres(&mut self, keep: impl FnMut(&Where) -> bool) {
        self.wheres.retain(keep);
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: impl Into<Direction>) -> Self {
        self.orders.push(Order {
            column: column.into(),
            direction: direction.into(),
        });
        self
    }

    /// Only positive limits are recorded.
    pub fn limit(mut self, value: i64) -> Self {
        if value > 0 {
            self.limit = Some(value as u64);
        }
        self
    }

    pub fn take(self, value: i64) -> Self {
        self.limit(value)
    }

    /// Negative offsets clamp to zero.
    pub fn offset(mut self, value: i64) -> Self {
        self.offset = Some(value.max(0) as u64);
        self
    }

    pub fn skip(self, value: i64) -> Self {
        self.offset(value)
    }

    /// `skip((page - 1) * per_page).take(per_page)`; pages start at 1.
    pub fn for_page(self, page: u64, per_page: u64) -> Self {
        let offset = page.saturating_sub(1).saturating_mul(per_page);
        self.skip(clamp(offset)).take(clamp(per_page))
    }

    // --- terminals ---

    /// URL and options a select would send.
    pub fn compile(&self) -> (String, RequestOptions) {
        self.client.grammar().compile_select(self)
    }

    async fn run_select(&self) -> Result<Option<Value>> {
        let (url, options) = self.compile();
        self.client.select(&url, options).await
    }

    /// Run the query. A missing collection yields no rows.
    pub async fn get(&self) -> Result<Vec<Value>> {
        Ok(self.get_with_total().await?.0)
    }

    /// Run the query, also returning the total the server reported.
    pub async fn get_with_total(&self) -> Result<(Vec<Value>, Option<u64>)> {
        let Some(document) = self.run_select().await? else {
            return Ok((Vec::new(), None));
        };
        let processor = self.client.processor();
        let total = processor.process_total(&document);
        Ok((processor.process_select(document), total))
    }

    pub async fn first(&self) -> Result<Option<Value>> {
        Ok(self.clone().take(1).get().await?.into_iter().next())
    }

    /// First row whose `id` equals `id`.
    pub async fn find(&self, id: impl Into<Value>) -> Result<Option<Value>> {
        self.clone().where_eq("id", id)?.first().await
    }

    /// One column of the first row.
    pub async fn value(&self, column: &str) -> Result<Option<Value>> {
        Ok(self.first().await?.and_then(|row| row.get(column).cloned()))
    }

    /// Page through the results, `count` rows at a time.
    ///
    /// Stops after an empty page, a page shorter than `count`, a page that
    /// reaches the reported total, or when `callback` resolves to `false`.
    pub async fn chunk<F, Fut>(&self, count: u64, mut callback: F) -> Result<()>
    where
        F: FnMut(Vec<Value>) -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        if count == 0 {
            return Err(Error::InvalidArgument("chunk size must be positive".to_string()));
        }

        let mut page = 1u64;
        loop {
            let (rows, total) = self.clone().for_page(page, count).get_with_total().await?;
            if rows.is_empty() {
                break;
            }

            let fetched = rows.len() as u64;
            let seen = (page - 1) * count + fetched;
            debug!(path = %self.path, page, fetched, ?total, "Processing chunk");

            if !callback(rows).await? {
                break;
            }
            if fetched < count || total.is_some_and(|total| seen >= total) {
                break;
            }
            page += 1;
        }

        Ok(())
    }

    /// Total matching rows, as reported by the server. Sends `limit=1`.
    pub async fn count(&self) -> Result<u64> {
        let query = self.clone().limit(1);
        let Some(document) = query.run_select().await? else {
            return Ok(0);
        };
        Ok(self.client.processor().process_count(&document))
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(self.count().await? > 0)
    }

    /// POST rows to the service, one request per row.
    pub async fn insert(&self, rows: impl Into<InsertRows>) -> Result<()> {
        let rows = match rows.into() {
            InsertRows::One(row) if row.is_empty() => Vec::new(),
            InsertRows::One(row) => vec![row],
            InsertRows::Many(rows) => rows.into_iter().map(sort_keys).collect(),
        };

        for row in &rows {
            let (url, options) = self.client.grammar().compile_insert(self, row);
            self.client.insert(&url, options).await?;
        }
        Ok(())
    }

    /// POST one row and read the created id from the response.
    pub async fn insert_get_id(&self, row: Map<String, Value>, key: &str) -> Result<ResourceId> {
        let (url, options) = self.client.grammar().compile_insert_get_id(self, &row);
        let response = self.client.insert(&url, options).await?;

        self.client
            .processor()
            .process_insert_get_id(&response, key)
            .ok_or_else(|| Error::Protocol {
                snippet: format!("insert response carries no [{key}]"),
            })
    }

    /// POST one row to a service that answers with a collection of created
    /// resources. A plain document counts as a single resource.
    pub async fn insert_collection(&self, row: Map<String, Value>) -> Result<Vec<Value>> {
        let (url, options) = self.client.grammar().compile_insert(self, &row);
        let response = self.client.insert(&url, options).await?;

        Ok(match response {
            Value::Object(ref map) if map.contains_key("items") => {
                self.client.processor().process_select(response)
            }
            Value::Object(_) => vec![response],
            _ => Vec::new(),
        })
    }

    /// PUT `values` over every matching record, addressed by its self link.
    ///
    /// Records are fetched in pages of [`MUTATION_CHUNK_SIZE`] and rewritten
    /// one by one. Nothing guards against concurrent writers between the read
    /// and the write: the last self link wins.
    pub async fn update(&self, values: Map<String, Value>) -> Result<u64> {
        let values = Arc::new(values);
        let mut updated = 0u64;

        self.chunk(MUTATION_CHUNK_SIZE, |rows| {
            updated += rows.len() as u64;
            let client = Arc::clone(&self.client);
            let values = Arc::clone(&values);
            async move {
                for row in &rows {
                    let (url, options) = client.grammar().compile_update(row, &values)?;
                    client.update(&url, options).await?;
                }
                Ok::<_, Error>(true)
            }
        })
        .await?;

        Ok(updated)
    }

    /// DELETE every matching record, addressed by its self link.
    ///
    /// Paging advances while records disappear, so matches beyond the first
    /// page may be skipped and need another call.
    pub async fn delete(&self) -> Result<u64> {
        let mut deleted = 0u64;

        self.chunk(MUTATION_CHUNK_SIZE, |rows| {
            deleted += rows.len() as u64;
            let client = Arc::clone(&self.client);
            async move {
                for row in &rows {
                    let (url, options) = client.grammar().compile_delete(row)?;
                    client.delete(&url, options).await?;
                }
                Ok::<_, Error>(true)
            }
        })
        .await?;

        Ok(deleted)
    }
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn sort_keys(row: Map<String, Value>) -> Map<String, Value> {
    row.into_iter()
        .collect::<BTreeMap<_, _>>()
        .into_iter()
        .collect()
}

use serde_json::Value;

use crate::error::StoreError;
use crate::{StoreBackend, PAGE_SIZE};

/// A single filter term. `Or` nests one level of disjunction.
#[derive(Debug, Clone)]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    In(String, Vec<Value>),
    /// Case-insensitive LIKE; pattern uses `%` wildcards.
    Ilike(String, String),
    Or(Vec<Filter>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Select,
    Insert,
    Upsert,
    Update,
    Delete,
}

/// Structured query handed to a backend. Built by [`TableQuery`], rendered
/// to PostgREST params or SQL by the backend — never by callers.
#[derive(Debug, Clone)]
pub struct Query {
    pub table: String,
    pub op: Op,
    pub columns: String,
    pub filters: Vec<Filter>,
    pub order: Option<(String, bool)>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub rows: Vec<Value>,
    pub patch: Option<Value>,
    pub on_conflict: Option<String>,
}

impl Query {
    fn new(table: &str, op: Op) -> Self {
        Self {
            table: table.to_string(),
            op,
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
            offset: 0,
            rows: Vec::new(),
            patch: None,
            on_conflict: None,
        }
    }
}

/// Fluent selector over one table.
pub struct TableQuery<'a> {
    backend: &'a dyn StoreBackend,
    query: Query,
}

impl<'a> TableQuery<'a> {
    pub(crate) fn new(backend: &'a dyn StoreBackend, table: &str) -> Self {
        Self {
            backend,
            query: Query::new(table, Op::Select),
        }
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.query.columns = columns.to_string();
        self
    }

    pub fn eq(mut self, col: &str, v: impl Into<Value>) -> Self {
        self.query.filters.push(Filter::Eq(col.to_string(), v.into()));
        self
    }

    pub fn neq(mut self, col: &str, v: impl Into<Value>) -> Self {
        self.query.filters.push(Filter::Neq(col.to_string(), v.into()));
        self
    }

    pub fn gte(mut self, col: &str, v: impl Into<Value>) -> Self {
        self.query.filters.push(Filter::Gte(col.to_string(), v.into()));
        self
    }

    pub fn lt(mut self, col: &str, v: impl Into<Value>) -> Self {
        self.query.filters.push(Filter::Lt(col.to_string(), v.into()));
        self
    }

    pub fn r#in(mut self, col: &str, vs: Vec<Value>) -> Self {
        self.query.filters.push(Filter::In(col.to_string(), vs));
        self
    }

    pub fn ilike(mut self, col: &str, pattern: &str) -> Self {
        self.query
            .filters
            .push(Filter::Ilike(col.to_string(), pattern.to_string()));
        self
    }

    pub fn or(mut self, terms: Vec<Filter>) -> Self {
        self.query.filters.push(Filter::Or(terms));
        self
    }

    pub fn order(mut self, col: &str, ascending: bool) -> Self {
        self.query.order = Some((col.to_string(), ascending));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.query.limit = Some(n);
        self
    }

    pub fn range(mut self, offset: usize, limit: usize) -> Self {
        self.query.offset = offset;
        self.query.limit = Some(limit);
        self
    }

    /// Run the select, paginating transparently in pages of ≤[`PAGE_SIZE`]
    /// and stopping on the first short page.
    pub async fn fetch(mut self) -> Result<Vec<Value>, StoreError> {
        self.query.op = Op::Select;
        let wanted = self.query.limit;
        let mut offset = self.query.offset;
        let mut out: Vec<Value> = Vec::new();

        loop {
            let remaining = wanted.map(|w| w.saturating_sub(out.len()));
            if remaining == Some(0) {
                break;
            }
            let page_limit = remaining.map_or(PAGE_SIZE, |r| r.min(PAGE_SIZE));

            let mut page_query = self.query.clone();
            page_query.offset = offset;
            page_query.limit = Some(page_limit);

            let page = self.backend.select(&page_query).await?;
            let got = page.len();
            out.extend(page);

            if got < page_limit {
                break;
            }
            offset += got;
        }

        Ok(out)
    }

    /// Select expecting at most one row.
    pub async fn fetch_one(self) -> Result<Option<Value>, StoreError> {
        let rows = self.limit(1).fetch().await?;
        Ok(rows.into_iter().next())
    }

    pub async fn insert(mut self, rows: Vec<Value>) -> Result<u64, StoreError> {
        self.query.op = Op::Insert;
        self.query.rows = rows;
        self.backend.write(&self.query).await
    }

    /// Insert-or-merge on the named conflict key(s). Only the columns
    /// present in each row are written, so partial rows never clobber
    /// columns they do not mention.
    pub async fn upsert(
        mut self,
        rows: Vec<Value>,
        on_conflict: &str,
    ) -> Result<u64, StoreError> {
        self.query.op = Op::Upsert;
        self.query.rows = rows;
        self.query.on_conflict = Some(on_conflict.to_string());
        self.backend.write(&self.query).await
    }

    pub async fn update(mut self, patch: Value) -> Result<u64, StoreError> {
        self.query.op = Op::Update;
        self.query.patch = Some(patch);
        self.backend.write(&self.query).await
    }

    pub async fn delete(mut self) -> Result<u64, StoreError> {
        self.query.op = Op::Delete;
        self.backend.write(&self.query).await
    }
}

use super::{DataService, QueryResponse};
use futures::future::BoxFuture;
use serde_json::Value;
use std::future::IntoFuture;

/// Row predicate. Conditions on one query are ANDed.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    Neq(String, Value),
    In(String, Vec<Value>),
    /// SQL `ILIKE` with `%` and `_` wildcards
    ILike(String, String),
    /// SQL `IS`: null or boolean
    Is(String, Value),
}

impl Condition {
    pub fn column(&self) -> &str {
        match self {
            Condition::Eq(column, _)
            | Condition::Neq(column, _)
            | Condition::In(column, _)
            | Condition::ILike(column, _)
            | Condition::Is(column, _) => column,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub order: SortOrder,
}

/// What a query does with the matched rows
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Operation {
    #[default]
    Select,
    Insert(Vec<Value>),
    Upsert(Vec<Value>),
    /// Column values to set on every matched row
    Update(Value),
    Delete,
}

impl Operation {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Operation::Select)
    }
}

/// Backend-independent description of one table query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub table: String,
    /// Projected columns; `None` selects every column
    pub columns: Option<Vec<String>>,
    pub conditions: Vec<Condition>,
    /// First entry is the primary sort key
    pub order_by: Vec<OrderBy>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
    /// Resolve to the first row (or null) instead of an array
    pub single: bool,
    /// Report how many rows match before pagination
    pub count: bool,
    pub operation: Operation,
}

impl Query {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }
}

/// Chainable query against a [`DataService`].
///
/// Awaiting the builder runs the query and resolves to a [`QueryResponse`].
///
/// ```no_run
/// use zdirectory::data::{DataServiceExt, MemoryDataService, SortOrder};
///
/// # async fn demo() -> anyhow::Result<()> {
/// let service = MemoryDataService::fixture()?;
/// let response = service
///     .from_table("zcasher")
///     .select("id, name")
///     .eq("featured", true)
///     .order("name", SortOrder::Ascending)
///     .limit(10)
///     .await;
/// # Ok(())
/// # }
/// ```
#[must_use = "a query does nothing until it is awaited"]
pub struct QueryBuilder<'a, S: DataService + ?Sized> {
    service: &'a S,
    query: Query,
}

impl<'a, S: DataService + ?Sized> QueryBuilder<'a, S> {
    pub fn new(service: &'a S, table: impl Into<String>) -> Self {
        Self {
            service,
            query: Query::new(table),
        }
    }

    /// Project columns from a comma-separated list; `*` selects all
    pub fn select(mut self, columns: &str) -> Self {
        let columns: Vec<String> = columns
            .split(',')
            .map(str::trim)
            .filter(|column| !column.is_empty())
            .map(str::to_string)
            .collect();

        self.query.columns = if columns.is_empty() || columns.iter().any(|c| c == "*") {
            None
        } else {
            Some(columns)
        };
        self
    }

    /// Also report the number of matching rows before pagination
    pub fn count_exact(mut self) -> Self {
        self.query.count = true;
        self
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query
            .conditions
            .push(Condition::Eq(column.into(), value.into()));
        self
    }

    pub fn neq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query
            .conditions
            .push(Condition::Neq(column.into(), value.into()));
        self
    }

    /// Column value is one of `values`
    pub fn is_in<V, I>(mut self, column: impl Into<String>, values: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.query
            .conditions
            .push(Condition::In(column.into(), values));
        self
    }

    /// Case-insensitive `LIKE` match
    pub fn ilike(mut self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.query
            .conditions
            .push(Condition::ILike(column.into(), pattern.into()));
        self
    }

    pub fn is(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query
            .conditions
            .push(Condition::Is(column.into(), value.into()));
        self
    }

    /// Add a sort key. The first call is the primary key.
    pub fn order(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.query.order_by.push(OrderBy {
            column: column.into(),
            order,
        });
        self
    }

    pub fn limit(mut self, count: usize) -> Self {
        self.query.limit = Some(count);
        self
    }

    /// Inclusive row range, zero-based
    pub fn range(mut self, from: usize, to: usize) -> Self {
        self.query.offset = Some(from);
        self.query.limit = Some(if to >= from { (to - from).saturating_add(1) } else { 0 });
        self
    }

    /// Resolve to the first row, or null when nothing matches
    pub fn single(mut self) -> Self {
        self.query.single = true;
        self
    }

    /// Insert one row (an object) or several (an array of objects)
    pub fn insert(mut self, rows: impl Into<Value>) -> Self {
        self.query.operation = Operation::Insert(into_rows(rows.into()));
        self
    }

    pub fn upsert(mut self, rows: impl Into<Value>) -> Self {
        self.query.operation = Operation::Upsert(into_rows(rows.into()));
        self
    }

    /// Set column values on every row matched by the conditions
    pub fn update(mut self, values: impl Into<Value>) -> Self {
        self.query.operation = Operation::Update(values.into());
        self
    }

    pub fn delete(mut self) -> Self {
        self.query.operation = Operation::Delete;
        self
    }

    /// The query built so far
    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn into_query(self) -> Query {
        self.query
    }
}

impl<'a, S: DataService + ?Sized + 'a> IntoFuture for QueryBuilder<'a, S> {
    type Output = QueryResponse;
    type IntoFuture = BoxFuture<'a, QueryResponse>;

    fn into_future(self) -> Self::IntoFuture {
        self.service.execute(self.query)
    }
}

fn into_rows(value: Value) -> Vec<Value> {
    match value {
        Value::Array(rows) => rows,
        Value::Null => Vec::new(),
        row => vec![row],
    }
}

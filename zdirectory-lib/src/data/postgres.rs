use super::{Condition, DataService, Operation, Query, QueryResponse, SortOrder};
use crate::error::DataError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sea_query::extension::postgres::PgExpr;
use sea_query::{
    Alias, Asterisk, Cond, Expr, OnConflict, Order, PostgresQueryBuilder, Query as Sql,
    SelectStatement, SimpleExpr,
};
use serde_json::Value;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error};

/// [`DataService`] backed by a live Postgres database.
///
/// Every row comes back as JSON through `row_to_json`, so callers see the
/// same shape the in-memory service produces.
pub struct PostgresDataService {
    client: Client,
}

impl PostgresDataService {
    /// Connect and drive the connection on a background task
    pub async fn connect(database_url: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .with_context(|| "Failed to connect to database")?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "database connection error");
            }
        });

        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Check the connection with a trivial round trip
    pub async fn ping(&self) -> Result<()> {
        self.client
            .execute("SELECT 1", &[])
            .await
            .with_context(|| "Failed to ping database")?;
        Ok(())
    }

    async fn json_rows(&self, sql: &str) -> Result<Vec<Value>, DataError> {
        debug!(sql, "running query");
        let rows = self.client.query(sql, &[]).await?;
        rows.iter()
            .map(|row| row.try_get::<_, Value>(0).map_err(DataError::from))
            .collect()
    }

    async fn try_execute(&self, query: &Query) -> Result<QueryResponse, DataError> {
        if let Some(rows) = empty_write(query) {
            return Ok(QueryResponse::ok(rows));
        }

        let rows = self.json_rows(&render(query)?).await?;
        let data = if query.single {
            rows.into_iter().next().unwrap_or(Value::Null)
        } else {
            Value::Array(rows)
        };
        let response = QueryResponse::ok(data);

        if query.count && !query.operation.is_mutation() {
            let sql = render_count(query)?;
            let row = self.client.query_one(sql.as_str(), &[]).await?;
            let total: i64 = row.try_get(0)?;
            return Ok(response.with_count(usize::try_from(total).unwrap_or(0)));
        }

        Ok(response)
    }
}

#[async_trait]
impl DataService for PostgresDataService {
    async fn execute(&self, query: Query) -> QueryResponse {
        match self.try_execute(&query).await {
            Ok(response) => response,
            Err(e) => {
                error!(table = %query.table, error = %e, "query failed");
                QueryResponse::failed(e)
            }
        }
    }
}

/// Inserts and upserts with no rows never reach the database
fn empty_write(query: &Query) -> Option<Value> {
    match &query.operation {
        Operation::Insert(rows) | Operation::Upsert(rows) if rows.is_empty() => {
            Some(Value::Array(Vec::new()))
        }
        _ => None,
    }
}

/// SQL returning one JSON column per row, as `row_to_json`
pub fn render(query: &Query) -> Result<String, DataError> {
    let inner = match &query.operation {
        Operation::Select => {
            let mut select = filtered(query);
            for key in &query.order_by {
                let order = match key.order {
                    SortOrder::Ascending => Order::Asc,
                    SortOrder::Descending => Order::Desc,
                };
                select.order_by(Alias::new(key.column.as_str()), order);
            }
            if let Some(limit) = query.limit {
                select.limit(limit as u64);
            }
            if let Some(offset) = query.offset {
                select.offset(offset as u64);
            }
            if query.single && query.limit.is_none() {
                select.limit(1);
            }
            return Ok(format!(
                "SELECT row_to_json(q) FROM ({}) q",
                select.to_string(PostgresQueryBuilder)
            ));
        }
        Operation::Insert(rows) => render_insert(&query.table, rows, false)?,
        Operation::Upsert(rows) => render_insert(&query.table, rows, true)?,
        Operation::Update(values) => {
            let Value::Object(values) = values else {
                return Err(DataError::InvalidQuery(
                    "update values must be an object".to_string(),
                ));
            };
            if values.is_empty() {
                return Err(DataError::InvalidQuery("update sets no columns".to_string()));
            }
            Sql::update()
                .table(Alias::new(query.table.as_str()))
                .values(
                    values
                        .iter()
                        .map(|(column, value)| (Alias::new(column.as_str()), literal(value))),
                )
                .cond_where(conditions(query))
                .returning_all()
                .to_string(PostgresQueryBuilder)
        }
        Operation::Delete => Sql::delete()
            .from_table(Alias::new(query.table.as_str()))
            .cond_where(conditions(query))
            .returning_all()
            .to_string(PostgresQueryBuilder),
    };

    Ok(format!("WITH q AS ({}) SELECT row_to_json(q) FROM q", inner))
}

/// SQL counting the rows matched by the filters, ignoring pagination
pub fn render_count(query: &Query) -> Result<String, DataError> {
    if query.operation.is_mutation() {
        return Err(DataError::InvalidQuery(
            "count is only available on selects".to_string(),
        ));
    }
    Ok(format!(
        "SELECT count(*) FROM ({}) q",
        filtered(query).to_string(PostgresQueryBuilder)
    ))
}

fn filtered(query: &Query) -> SelectStatement {
    let mut select = Sql::select();
    match &query.columns {
        Some(columns) => {
            select.columns(columns.iter().map(|column| Alias::new(column.as_str())));
        }
        None => {
            select.column(Asterisk);
        }
    }
    select
        .from(Alias::new(query.table.as_str()))
        .cond_where(conditions(query));
    select
}

fn conditions(query: &Query) -> Cond {
    query
        .conditions
        .iter()
        .fold(Cond::all(), |all, condition| all.add(condition_expr(condition)))
}

fn condition_expr(condition: &Condition) -> SimpleExpr {
    let column = |name: &str| Expr::col(Alias::new(name));
    match condition {
        Condition::Eq(name, value) => column(name).eq(literal(value)),
        Condition::Neq(name, value) => column(name).ne(literal(value)),
        Condition::In(name, values) => column(name).is_in(values.iter().map(literal)),
        Condition::ILike(name, pattern) => column(name).ilike(pattern.as_str()),
        Condition::Is(name, Value::Null) => column(name).is_null(),
        Condition::Is(name, value) => column(name).is(literal(value)),
    }
}

fn render_insert(table: &str, rows: &[Value], upsert: bool) -> Result<String, DataError> {
    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        let Value::Object(row) = row else {
            return Err(DataError::InvalidQuery(
                "inserted rows must be objects".to_string(),
            ));
        };
        for column in row.keys() {
            if !columns.contains(&column.as_str()) {
                columns.push(column);
            }
        }
    }
    if columns.is_empty() {
        return Err(DataError::InvalidQuery("inserted rows have no columns".to_string()));
    }

    let mut insert = Sql::insert();
    insert
        .into_table(Alias::new(table))
        .columns(columns.iter().map(|column| Alias::new(*column)));

    for row in rows {
        let values = columns.iter().map(|column| match row.get(*column) {
            Some(value) => literal(value),
            None => Expr::cust("DEFAULT"),
        });
        insert
            .values(values)
            .map_err(|e| DataError::InvalidQuery(e.to_string()))?;
    }

    if upsert {
        let updated: Vec<Alias> = columns
            .iter()
            .filter(|column| **column != "id")
            .map(|column| Alias::new(*column))
            .collect();
        let on_conflict = if updated.is_empty() {
            OnConflict::column(Alias::new("id")).do_nothing().to_owned()
        } else {
            OnConflict::column(Alias::new("id"))
                .update_columns(updated)
                .to_owned()
        };
        insert.on_conflict(on_conflict);
    }

    Ok(insert.returning_all().to_string(PostgresQueryBuilder))
}

/// Inline SQL literal for a JSON value. Postgres coerces quoted literals to
/// the column type, so timestamps and json columns take plain strings.
fn literal(value: &Value) -> SimpleExpr {
    match value {
        Value::Null => Expr::cust("NULL"),
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.into(),
            None => n.as_f64().unwrap_or_default().into(),
        },
        Value::String(s) => s.as_str().into(),
        other => other.to_string().into(),
    }
}

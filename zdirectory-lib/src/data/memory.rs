use super::{Condition, DataService, Operation, Query, QueryResponse, SortOrder};
use crate::error::DataError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

const DEFAULT_FIXTURE: &str = include_str!("../../fixtures/mock_tables.yaml");

/// In-memory stand-in for the real backend.
///
/// Reads follow the same semantics as [`PostgresDataService`](super::PostgresDataService).
/// Mutations are logged and echoed back but never change the tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryDataService {
    tables: HashMap<String, Vec<Value>>,
    aliases: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct Fixture {
    #[serde(default)]
    tables: HashMap<String, Vec<Value>>,
    /// Alias table name -> table it reads from
    #[serde(default)]
    aliases: HashMap<String, String>,
}

impl MemoryDataService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Service over the bundled demo tables
    pub fn fixture() -> Result<Self> {
        Self::from_yaml_str(DEFAULT_FIXTURE).context("Failed to parse bundled fixture")
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let fixture: Fixture =
            serde_yaml::from_str(content).with_context(|| "Failed to parse fixture YAML")?;

        Ok(Self {
            tables: fixture.tables,
            aliases: fixture.aliases,
        })
    }

    pub async fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read fixture file: {}", path.as_ref().display()))?;

        Self::from_yaml_str(&content)
    }

    pub fn with_table(mut self, name: impl Into<String>, rows: Vec<Value>) -> Self {
        self.tables.insert(name.into(), rows);
        self
    }

    /// Serve `alias` from the rows of `target`
    pub fn with_alias(mut self, alias: impl Into<String>, target: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), target.into());
        self
    }

    /// Table names, aliases included, sorted
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables
            .keys()
            .chain(self.aliases.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn rows(&self, table: &str) -> &[Value] {
        let name = self.aliases.get(table).map(String::as_str).unwrap_or(table);
        match self.tables.get(name) {
            Some(rows) => rows.as_slice(),
            None => {
                debug!(table, "unknown mock table, returning no rows");
                &[]
            }
        }
    }

    /// Run a query synchronously
    pub fn run(&self, query: &Query) -> QueryResponse {
        match self.try_run(query) {
            Ok(response) => response,
            Err(error) => QueryResponse::failed(error),
        }
    }

    fn try_run(&self, query: &Query) -> Result<QueryResponse, DataError> {
        match &query.operation {
            Operation::Select => self.select(query),
            Operation::Insert(rows) => {
                info!(table = %query.table, rows = rows.len(), "mock insert not applied");
                Ok(QueryResponse::ok(Value::Array(rows.clone())))
            }
            Operation::Upsert(rows) => {
                info!(table = %query.table, rows = rows.len(), "mock upsert not applied");
                Ok(QueryResponse::ok(Value::Array(rows.clone())))
            }
            Operation::Update(values) => {
                if !values.is_object() {
                    return Err(DataError::InvalidQuery(
                        "update values must be an object".to_string(),
                    ));
                }
                let matched = self.matching(query)?;
                info!(table = %query.table, rows = matched.len(), "mock update not applied");
                Ok(QueryResponse::ok(Value::Array(matched.into_iter().cloned().collect())))
            }
            Operation::Delete => {
                let matched = self.matching(query)?;
                info!(table = %query.table, rows = matched.len(), "mock delete not applied");
                Ok(QueryResponse::ok(Value::Array(matched.into_iter().cloned().collect())))
            }
        }
    }

    fn select(&self, query: &Query) -> Result<QueryResponse, DataError> {
        let mut rows = self.matching(query)?;

        if !query.order_by.is_empty() {
            rows.sort_by(|a, b| {
                query
                    .order_by
                    .iter()
                    .map(|key| {
                        let ordering = compare_values(field(a, &key.column), field(b, &key.column));
                        match key.order {
                            SortOrder::Ascending => ordering,
                            SortOrder::Descending => ordering.reverse(),
                        }
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }

        let total = rows.len();
        let page: Vec<Value> = rows
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|row| project(row, query.columns.as_deref()))
            .collect();

        let data = if query.single {
            page.into_iter().next().unwrap_or(Value::Null)
        } else {
            Value::Array(page)
        };

        let response = QueryResponse::ok(data);
        Ok(if query.count {
            response.with_count(total)
        } else {
            response
        })
    }

    fn matching(&self, query: &Query) -> Result<Vec<&Value>, DataError> {
        let predicates = query
            .conditions
            .iter()
            .map(Predicate::compile)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self
            .rows(&query.table)
            .iter()
            .filter(|row| predicates.iter().all(|predicate| predicate.matches(row)))
            .collect())
    }
}

#[async_trait]
impl DataService for MemoryDataService {
    async fn execute(&self, query: Query) -> QueryResponse {
        self.run(&query)
    }
}

enum Predicate<'q> {
    Condition(&'q Condition),
    Like(&'q str, Regex),
}

impl<'q> Predicate<'q> {
    fn compile(condition: &'q Condition) -> Result<Self, DataError> {
        match condition {
            Condition::ILike(column, pattern) => Ok(Predicate::Like(column, like_regex(pattern)?)),
            other => Ok(Predicate::Condition(other)),
        }
    }

    fn matches(&self, row: &Value) -> bool {
        match self {
            Predicate::Like(column, regex) => match field(row, column) {
                Value::String(s) => regex.is_match(s),
                _ => false,
            },
            Predicate::Condition(Condition::Eq(column, value)) => {
                values_equal(field(row, column), value)
            }
            Predicate::Condition(Condition::Neq(column, value)) => {
                let current = field(row, column);
                !current.is_null() && !value.is_null() && !values_equal(current, value)
            }
            Predicate::Condition(Condition::In(column, values)) => {
                let current = field(row, column);
                values.iter().any(|value| values_equal(current, value))
            }
            Predicate::Condition(Condition::Is(column, value)) => {
                let current = field(row, column);
                match value {
                    Value::Null => current.is_null(),
                    other => current == other,
                }
            }
            Predicate::Condition(Condition::ILike(..)) => false,
        }
    }
}

fn field<'r>(row: &'r Value, column: &str) -> &'r Value {
    row.get(column).unwrap_or(&Value::Null)
}

/// SQL equality: null equals nothing, numbers compare by value
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Ascending order with nulls last
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Translate a SQL `LIKE` pattern into an anchored, case-insensitive regex.
/// `%` is any run, `_` any single character, `\` escapes the next character.
fn like_regex(pattern: &str) -> Result<Regex, DataError> {
    let mut translated = String::from("^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => translated.push_str(".*"),
            '_' => translated.push('.'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    translated.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');

    RegexBuilder::new(&translated)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| DataError::InvalidQuery(format!("bad ilike pattern '{}': {}", pattern, e)))
}

fn project(row: &Value, columns: Option<&[String]>) -> Value {
    match (row, columns) {
        (Value::Object(object), Some(columns)) => {
            let projected: Map<String, Value> = columns
                .iter()
                .filter_map(|column| object.get(column).map(|v| (column.clone(), v.clone())))
                .collect();
            Value::Object(projected)
        }
        _ => row.clone(),
    }
}

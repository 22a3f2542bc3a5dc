//! Backend access behind a small chainable query interface.
//!
//! Every backend implements [`DataService`]; callers build queries with
//! [`DataServiceExt::from_table`] and await them to get a [`QueryResponse`]
//! in the `{data, error, count}` shape. A non-null `error` means `data`
//! must not be trusted.

mod memory;
mod postgres;
mod query;

pub use memory::*;
pub use postgres::*;
pub use query::*;

use crate::error::DataError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[async_trait]
pub trait DataService: Send + Sync {
    /// Run a query. Failures are reported in the response, never panicked.
    async fn execute(&self, query: Query) -> QueryResponse;
}

/// Entry point for building queries against any [`DataService`]
pub trait DataServiceExt: DataService {
    fn from_table(&self, table: &str) -> QueryBuilder<'_, Self> {
        QueryBuilder::new(self, table)
    }
}

impl<T: DataService + ?Sized> DataServiceExt for T {}

/// Query result in the `{data, error, count}` shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub data: Option<Value>,
    pub error: Option<DataError>,
    pub count: Option<usize>,
}

impl QueryResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            data: Some(data),
            error: None,
            count: None,
        }
    }

    pub fn failed(error: DataError) -> Self {
        Self {
            data: None,
            error: Some(error),
            count: None,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// The data, or the error if one was reported
    pub fn into_result(self) -> Result<Value, DataError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data.unwrap_or(Value::Null)),
        }
    }

    /// Rows as raw JSON values. Null is no rows; a single object is one row.
    pub fn into_rows(self) -> Result<Vec<Value>, DataError> {
        match self.into_result()? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            row => Ok(vec![row]),
        }
    }

    /// Rows decoded into `T`; the first row that fails to decode fails the lot
    pub fn rows<T: DeserializeOwned>(self) -> Result<Vec<T>, DataError> {
        self.into_rows()?
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(DataError::from))
            .collect()
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a [`DataService`](crate::data::DataService).
///
/// Carried inside a [`QueryResponse`](crate::data::QueryResponse) rather than
/// returned directly, so it has to be cloneable and serializable.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum DataError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Failed to decode row: {0}")]
    Decode(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

impl From<tokio_postgres::Error> for DataError {
    fn from(err: tokio_postgres::Error) -> Self {
        if err.is_closed() {
            DataError::Connection(err.to_string())
        } else {
            DataError::Query(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::Decode(err.to_string())
    }
}

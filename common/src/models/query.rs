//! SQL query models.
//!
//! Contains the request, parameter and normalized result shapes shared by all
//! driver adapters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use validator::Validate;

/// One result row: column name to value, in column order.
pub type JsonRow = Map<String, Value>;

/// Request body for executing a SQL query.
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct QueryRequest {
    /// SQL statement to execute, passed through verbatim.
    #[validate(length(min = 1, message = "Query is required"))]
    pub query: String,

    /// Positional parameters (`$1`, `$2`, ...; `?` for MySQL).
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub parameters: Vec<SqlParam>,
}

/// A positional query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlParam {
    /// SQL NULL.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Arrays and objects, bound as JSON.
    Json(Value),
}

impl From<Value> for SqlParam {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => SqlParam::Null,
            Value::Bool(b) => SqlParam::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlParam::Int(i),
                None => SqlParam::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => SqlParam::Text(s),
            other => SqlParam::Json(other),
        }
    }
}

/// Normalized result of a query, identical across protocol families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QueryResult {
    /// Row objects in the order the server returned them.
    #[schema(value_type = Vec<Object>)]
    pub rows: Vec<JsonRow>,

    /// Rows returned, or rows affected for statements without a result set.
    pub row_count: u64,

    /// Column names in result order.
    pub columns: Vec<String>,

    /// Query execution time in milliseconds.
    #[serde(default)]
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Creates an empty query result.
    pub fn empty() -> Self {
        Self {
            rows: vec![],
            row_count: 0,
            columns: vec![],
            execution_time_ms: 0,
        }
    }

    /// Creates a result for a row-returning statement.
    pub fn from_rows(columns: Vec<String>, rows: Vec<JsonRow>) -> Self {
        Self {
            row_count: rows.len() as u64,
            rows,
            columns,
            execution_time_ms: 0,
        }
    }

    /// Creates a result for a statement that only reports affected rows.
    pub fn affected(affected: u64) -> Self {
        Self {
            row_count: affected,
            ..Self::empty()
        }
    }
}

/// Outcome label of a connection test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// The server answered the version query.
    Connected,
    /// Pool creation or the version query failed.
    Failed,
}

/// Structured result of `test_connection`; failures are data, not errors.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectionTestResult {
    pub success: bool,
    pub status: TestStatus,
    pub name: String,
    pub message: String,
    /// First row of the server version query.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub version: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionTestResult {
    /// A successful connection test.
    pub fn connected(name: impl Into<String>, version: Option<Value>) -> Self {
        Self {
            success: true,
            status: TestStatus::Connected,
            name: name.into(),
            message: "Connection successful".to_string(),
            version,
            error: None,
        }
    }

    /// A failed connection test carrying the error text.
    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            status: TestStatus::Failed,
            name: name.into(),
            message: "Connection failed".to_string(),
            version: None,
            error: Some(error.into()),
        }
    }
}

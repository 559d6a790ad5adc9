//! Shared data models.

pub mod connection;
pub mod pool;
pub mod query;

// Re-export commonly used types
pub use connection::{ConnectionConfig, DbType, OptionMap, SecretConnectionConfig};
pub use pool::{PoolKey, PoolSnapshot, PoolStatus};
pub use query::{ConnectionTestResult, JsonRow, QueryRequest, QueryResult, SqlParam, TestStatus};

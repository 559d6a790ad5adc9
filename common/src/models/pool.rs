//! Pool identity and diagnostics models.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::connection::{DbType, OptionMap};

/// Composite key locating a cached pool: protocol family plus configuration id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct PoolKey {
    pub db_type: DbType,
    pub connection_id: String,
}

impl PoolKey {
    pub fn new(db_type: DbType, connection_id: impl Into<String>) -> Self {
        Self {
            db_type,
            connection_id: connection_id.into(),
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.db_type, self.connection_id)
    }
}

/// Native pool occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PoolStatus {
    /// Open connections (busy + idle).
    pub size: u32,
    /// Idle connections.
    pub idle: u32,
    /// Configured maximum pool size.
    pub max_size: u32,
}

/// Diagnostic view of one tracked pool.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PoolSnapshot {
    /// Rendered pool key (`{type}_{id}`).
    pub key: String,
    pub connection_id: String,
    pub db_type: DbType,
    /// Incremented every time a pool is built; identifies a pool instance.
    pub generation: u64,
    pub created_at: DateTime<Utc>,
    /// Merged driver options the pool was built with (never contains secrets).
    #[schema(value_type = Object)]
    pub options: OptionMap,
    pub status: PoolStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_key_display() {
        assert_eq!(PoolKey::new(DbType::Mssql, "12").to_string(), "mssql_12");
    }

    #[test]
    fn test_pool_key_equality_includes_protocol() {
        assert_ne!(
            PoolKey::new(DbType::MySQL, "1"),
            PoolKey::new(DbType::Postgres, "1")
        );
    }
}

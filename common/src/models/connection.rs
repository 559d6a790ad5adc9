//! Connection configuration models.
//!
//! A connection configuration describes one external database a user has
//! registered. The secret never lives on [`ConnectionConfig`]; it only travels
//! inside [`SecretConnectionConfig`], which is read by the pool-creation path.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::AppError;

/// Free-form protocol-specific options, keyed by option name.
pub type OptionMap = BTreeMap<String, serde_json::Value>;

/// Default pool size when the configuration does not carry one.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Default connection timeout in milliseconds.
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 30_000;

/// Supported database protocol families.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    /// MySQL database.
    MySQL,
    /// PostgreSQL database.
    Postgres,
    /// Microsoft SQL Server.
    Mssql,
}

impl DbType {
    /// Every supported protocol family.
    pub const ALL: [DbType; 3] = [DbType::MySQL, DbType::Postgres, DbType::Mssql];

    /// Returns the default port for this database type.
    pub fn default_port(&self) -> u16 {
        match self {
            DbType::MySQL => 3306,
            DbType::Postgres => 5432,
            DbType::Mssql => 1433,
        }
    }

    /// Returns the lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DbType::MySQL => "mysql",
            DbType::Postgres => "postgres",
            DbType::Mssql => "mssql",
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mysql" => Ok(DbType::MySQL),
            "postgres" | "postgresql" => Ok(DbType::Postgres),
            "mssql" | "sqlserver" => Ok(DbType::Mssql),
            other => Err(AppError::UnsupportedProtocol(other.to_string())),
        }
    }
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_connection_timeout() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

/// Connection configuration as returned by default read projections.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConnectionConfig {
    /// Unique connection identifier.
    pub id: String,
    /// Connection display name (globally unique).
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    /// Database protocol family.
    pub db_type: DbType,
    /// Database host.
    #[validate(length(min = 1, message = "Host is required"))]
    pub host: String,
    /// Database port.
    #[validate(range(min = 1, message = "Port must be a positive integer"))]
    pub port: u16,
    /// Database (or schema) name.
    pub database: String,
    /// Login user.
    pub username: String,
    /// Protocol-specific options merged over the driver defaults.
    #[serde(default)]
    pub options: OptionMap,
    /// Pool sizing hint.
    #[serde(default = "default_max_connections")]
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,
    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout")]
    #[validate(range(
        min = 1000,
        max = 120000,
        message = "Connection timeout must be between 1000ms and 120000ms"
    ))]
    pub connection_timeout: u64,
    /// Whether the transport should be encrypted.
    #[serde(default)]
    pub enable_ssl: bool,
    /// Inactive connections reject queries.
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Last time a pool was successfully built for this connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connected_at: Option<DateTime<Utc>>,
}

impl ConnectionConfig {
    /// Creates a configuration with the stored defaults applied.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        db_type: DbType,
        host: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            db_type,
            host: host.into(),
            port: db_type.default_port(),
            database: database.into(),
            username: username.into(),
            options: OptionMap::new(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT_MS,
            enable_ssl: false,
            is_active: true,
            last_connected_at: None,
        }
    }
}

/// Full configuration including the login secret.
///
/// Only the pool-creation path reads this projection. `Debug` output redacts
/// the password so the value can be logged safely.
#[derive(Clone)]
pub struct SecretConnectionConfig {
    /// The non-secret part of the configuration.
    pub config: ConnectionConfig,
    /// Login password.
    pub password: String,
}

impl SecretConnectionConfig {
    /// Pairs a configuration with its secret.
    pub fn new(config: ConnectionConfig, password: impl Into<String>) -> Self {
        Self {
            config,
            password: password.into(),
        }
    }
}

impl fmt::Debug for SecretConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretConnectionConfig")
            .field("config", &self.config)
            .field("password", &"********")
            .finish()
    }
}

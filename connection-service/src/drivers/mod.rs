//! Driver adapters.
//!
//! One adapter per supported protocol family. An adapter turns a connection
//! configuration into a native pool; the pool runs queries and maps native
//! rows into the common [`QueryResult`] shape. Adapters are looked up through
//! an [`AdapterTable`] keyed by [`DbType`].

#[cfg(test)]
pub(crate) mod fake;
pub mod mssql;
pub mod mysql;
pub mod options;
pub mod placeholder;
pub mod postgres;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use common::errors::{AppError, AppResult};
use common::models::{
    ConnectionConfig, DbType, OptionMap, PoolKey, PoolStatus, QueryResult,
    SecretConnectionConfig, SqlParam,
};

pub use mssql::MssqlAdapter;
pub use mysql::MySqlAdapter;
pub use options::ResolvedOptions;
pub use postgres::PostgresAdapter;

/// Trivial liveness query shared by every supported protocol.
pub const HEALTH_QUERY: &str = "SELECT 1 as test";

/// Protocol-specific translation layer between the core and one wire protocol.
#[async_trait]
pub trait DriverAdapter: Send + Sync {
    /// Protocol family served by this adapter.
    fn db_type(&self) -> DbType;

    /// Option keys accepted on top of [`options::COMMON_OPTIONS`].
    fn allowed_options(&self) -> &'static [&'static str];

    /// Protocol defaults, overridable by the configuration's free-form options.
    fn default_options(&self, config: &ConnectionConfig) -> OptionMap {
        options::base_defaults(config)
    }

    /// Query used by the health checker.
    fn health_query(&self) -> &'static str {
        HEALTH_QUERY
    }

    /// Query returning the server version, used by connection tests.
    fn version_query(&self) -> &'static str;

    /// Builds a native pool. `listener` receives asynchronous pool-level errors.
    async fn create_pool(
        &self,
        settings: &PoolSettings,
        listener: PoolErrorListener,
    ) -> AppResult<Arc<dyn NativePool>>;
}

/// A live, protocol-specific connection pool.
#[async_trait]
pub trait NativePool: Send + Sync {
    /// Runs `sql` with positional `params` and normalizes the result.
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> AppResult<QueryResult>;

    /// Closes the pool's connections.
    async fn close(&self) -> AppResult<()>;

    /// Current occupancy.
    fn status(&self) -> PoolStatus;
}

/// Everything an adapter needs to open a pool.
///
/// Structural fields always come from the configuration; `options` is the
/// merged defaults + free-form layer.
#[derive(Clone)]
pub struct PoolSettings {
    pub key: PoolKey,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub options: ResolvedOptions,
}

impl PoolSettings {
    pub fn new(secret: &SecretConnectionConfig, options: ResolvedOptions) -> Self {
        let config = &secret.config;
        Self {
            key: PoolKey::new(config.db_type, config.id.clone()),
            host: config.host.clone(),
            port: config.port,
            database: config.database.clone(),
            username: config.username.clone(),
            password: secret.password.clone(),
            options,
        }
    }
}

impl fmt::Debug for PoolSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolSettings")
            .field("key", &self.key)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"********")
            .field("options", &self.options)
            .finish()
    }
}

/// Callback handed to a native pool for errors raised outside of any query
/// (background connection failures).
#[derive(Clone)]
pub struct PoolErrorListener {
    callback: Arc<dyn Fn(String) + Send + Sync>,
}

impl PoolErrorListener {
    pub fn new(callback: impl Fn(String) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// A listener that drops every report.
    pub fn disabled() -> Self {
        Self::new(|_| {})
    }

    pub fn report(&self, reason: impl Into<String>) {
        (self.callback)(reason.into())
    }
}

impl fmt::Debug for PoolErrorListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolErrorListener").finish_non_exhaustive()
    }
}

/// Strategy table mapping each protocol family to its adapter.
#[derive(Clone, Default)]
pub struct AdapterTable {
    adapters: HashMap<DbType, Arc<dyn DriverAdapter>>,
}

impl AdapterTable {
    /// An empty table; every lookup fails with `UnsupportedProtocol`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the MySQL, PostgreSQL and SQL Server adapters registered.
    pub fn with_defaults() -> Self {
        Self::new()
            .with(Arc::new(MySqlAdapter))
            .with(Arc::new(PostgresAdapter))
            .with(Arc::new(MssqlAdapter))
    }

    /// Registers (or replaces) the adapter for its protocol family.
    pub fn with(mut self, adapter: Arc<dyn DriverAdapter>) -> Self {
        self.adapters.insert(adapter.db_type(), adapter);
        self
    }

    pub fn get(&self, db_type: DbType) -> AppResult<Arc<dyn DriverAdapter>> {
        self.adapters
            .get(&db_type)
            .cloned()
            .ok_or_else(|| AppError::UnsupportedProtocol(db_type.to_string()))
    }
}

/// Converts an sqlx error, tagging transport-class failures so the
/// connection-error classifier recognizes them.
pub(crate) fn sqlx_error(db_type: DbType, err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => {
            AppError::driver(db_type, format!("connection error: {}", err))
        }
        _ => AppError::driver(db_type, err.to_string()),
    }
}

/// Renders binary column data as a `0x`-prefixed hex string.
pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for byte in bytes {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

//! Connection configuration store.
//!
//! The registry reads configurations by id and stamps `last_connected_at`
//! after a pool is built. Secrets are only returned by
//! [`ConnectionStore::find_by_id_with_secret`].

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use common::errors::{AppError, AppResult};
use common::models::connection::{DEFAULT_CONNECTION_TIMEOUT_MS, DEFAULT_MAX_CONNECTIONS};
use common::models::{ConnectionConfig, DbType, OptionMap, SecretConnectionConfig};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::RwLock;

/// Read access to registered connection configurations.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Default projection; never carries the password.
    async fn find_by_id(&self, id: &str) -> AppResult<Option<ConnectionConfig>>;

    /// Full projection including the login secret.
    async fn find_by_id_with_secret(&self, id: &str) -> AppResult<Option<SecretConnectionConfig>>;

    /// Records that a pool was just built for `id`.
    async fn update_last_connected(&self, id: &str) -> AppResult<()>;
}

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryConnectionStore {
    entries: RwLock<HashMap<String, SecretConnectionConfig>>,
}

impl MemoryConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a configuration.
    pub async fn insert(&self, entry: SecretConnectionConfig) {
        self.entries
            .write()
            .await
            .insert(entry.config.id.clone(), entry);
    }

    pub async fn last_connected(&self, id: &str) -> Option<DateTime<Utc>> {
        self.entries
            .read()
            .await
            .get(id)
            .and_then(|entry| entry.config.last_connected_at)
    }
}

#[async_trait]
impl ConnectionStore for MemoryConnectionStore {
    async fn find_by_id(&self, id: &str) -> AppResult<Option<ConnectionConfig>> {
        Ok(self.entries.read().await.get(id).map(|e| e.config.clone()))
    }

    async fn find_by_id_with_secret(&self, id: &str) -> AppResult<Option<SecretConnectionConfig>> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn update_last_connected(&self, id: &str) -> AppResult<()> {
        if let Some(entry) = self.entries.write().await.get_mut(id) {
            entry.config.last_connected_at = Some(Utc::now());
        }
        Ok(())
    }
}

/// Row from the `connections` table.
#[derive(sqlx::FromRow)]
struct ConnectionRow {
    id: String,
    name: String,
    #[sqlx(rename = "type")]
    db_type: String,
    host: String,
    port: i64,
    database: String,
    username: String,
    password: Option<String>,
    options: Option<String>,
    max_connections: Option<i64>,
    connection_timeout: Option<i64>,
    enable_ssl: Option<bool>,
    is_active: Option<bool>,
    last_connected_at: Option<NaiveDateTime>,
}

impl ConnectionRow {
    fn into_secret(self) -> AppResult<SecretConnectionConfig> {
        let db_type: DbType = self.db_type.parse()?;

        let options = match self.options.as_deref().map(str::trim) {
            None | Some("") | Some("null") => OptionMap::new(),
            Some(raw) => serde_json::from_str(raw).map_err(|e| {
                AppError::InvalidOptions(format!("connection {}: {}", self.id, e))
            })?,
        };

        let config = ConnectionConfig {
            port: column_int(&self.id, "port", Some(self.port), 0)?,
            max_connections: column_int(
                &self.id,
                "max_connections",
                self.max_connections,
                DEFAULT_MAX_CONNECTIONS,
            )?,
            connection_timeout: column_int(
                &self.id,
                "connection_timeout",
                self.connection_timeout,
                DEFAULT_CONNECTION_TIMEOUT_MS,
            )?,
            enable_ssl: self.enable_ssl.unwrap_or(false),
            is_active: self.is_active.unwrap_or(true),
            last_connected_at: self.last_connected_at.map(|t| t.and_utc()),
            options,
            id: self.id,
            name: self.name,
            db_type,
            host: self.host,
            database: self.database,
            username: self.username,
        };
        Ok(SecretConnectionConfig::new(config, self.password.unwrap_or_default()))
    }
}

fn column_int<T: TryFrom<i64>>(id: &str, column: &str, value: Option<i64>, default: T) -> AppResult<T> {
    match value {
        None => Ok(default),
        Some(v) => T::try_from(v)
            .map_err(|_| AppError::Store(format!("connection {}: {} out of range: {}", id, column, v))),
    }
}

/// Store backed by the bookkeeping SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteConnectionStore {
    pool: SqlitePool,
}

impl SqliteConnectionStore {
    /// Opens the bookkeeping database at `url`, creating the file if needed.
    pub async fn connect(url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::Store(format!("Invalid database url {}: {}", url, e)))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Store(format!("Failed to open {}: {}", url, e)))?;
        Ok(Self::new(pool))
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the `connections` table if it does not exist.
    pub async fn ensure_table(&self) -> AppResult<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS connections (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                name               VARCHAR(100) NOT NULL UNIQUE,
                "type"             TEXT NOT NULL CHECK ("type" IN ('mssql', 'postgres', 'mysql', 'oracle')),
                host               VARCHAR(255) NOT NULL,
                port               INTEGER NOT NULL,
                "database"         VARCHAR(100) NOT NULL,
                username           VARCHAR(100) NOT NULL,
                password           VARCHAR(255) NOT NULL,
                options            JSON NULL,
                max_connections    INTEGER DEFAULT 10,
                connection_timeout INTEGER DEFAULT 30000,
                enable_ssl         BOOLEAN DEFAULT 0,
                is_active          BOOLEAN DEFAULT 1,
                last_connected_at  DATETIME NULL,
                created_at         DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at         DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )"#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Store(format!("Failed to create connections table: {}", e)))?;

        tracing::info!("Bookkeeping table `connections` ensured");
        Ok(())
    }

    async fn fetch(&self, id: &str, with_secret: bool) -> AppResult<Option<SecretConnectionConfig>> {
        let password = if with_secret { "password" } else { "NULL AS password" };
        let sql = format!(
            r#"SELECT CAST(id AS TEXT) AS id, name, "type", host, port, "database", username,
                      {password}, options, max_connections, connection_timeout,
                      enable_ssl, is_active, last_connected_at
               FROM connections WHERE id = ?"#
        );

        let row: Option<ConnectionRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Store(format!("Failed to load connection {}: {}", id, e)))?;

        row.map(ConnectionRow::into_secret).transpose()
    }
}

#[async_trait]
impl ConnectionStore for SqliteConnectionStore {
    async fn find_by_id(&self, id: &str) -> AppResult<Option<ConnectionConfig>> {
        Ok(self.fetch(id, false).await?.map(|secret| secret.config))
    }

    async fn find_by_id_with_secret(&self, id: &str) -> AppResult<Option<SecretConnectionConfig>> {
        self.fetch(id, true).await
    }

    async fn update_last_connected(&self, id: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE connections SET last_connected_at = CURRENT_TIMESTAMP, \
             updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Store(format!("Failed to update connection {}: {}", id, e)))?;
        Ok(())
    }
}

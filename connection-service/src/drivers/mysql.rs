//! MySQL adapter (sqlx).

use std::sync::Arc;

use async_trait::async_trait;
use common::errors::AppResult;
use common::models::{DbType, JsonRow, PoolStatus, QueryResult, SqlParam};
use futures::TryStreamExt;
use serde_json::Value;
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::query::Query;
use sqlx::types::{Decimal, Json};
use sqlx::{Column, Either, Executor, MySql, MySqlPool, Row, TypeInfo};

use super::{bytes_to_hex, sqlx_error, DriverAdapter, NativePool, PoolErrorListener, PoolSettings};

const MYSQL_OPTIONS: &[&str] = &["charset", "timezone"];

/// MySQL adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlAdapter;

#[async_trait]
impl DriverAdapter for MySqlAdapter {
    fn db_type(&self) -> DbType {
        DbType::MySQL
    }

    fn allowed_options(&self) -> &'static [&'static str] {
        MYSQL_OPTIONS
    }

    fn version_query(&self) -> &'static str {
        "SELECT VERSION() as version"
    }

    async fn create_pool(
        &self,
        settings: &PoolSettings,
        _listener: PoolErrorListener,
    ) -> AppResult<Arc<dyn NativePool>> {
        let options = &settings.options;
        let ssl_mode = if options.bool("ssl")?.unwrap_or(false) {
            MySqlSslMode::Required
        } else {
            MySqlSslMode::Disabled
        };

        let mut connect = MySqlConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .database(&settings.database)
            .username(&settings.username)
            .password(&settings.password)
            .ssl_mode(ssl_mode);
        if let Some(charset) = options.str("charset")? {
            connect = connect.charset(charset);
        }
        if let Some(timezone) = options.str("timezone")? {
            connect = connect.timezone(Some(timezone.to_string()));
        }

        let mut pool_options = MySqlPoolOptions::new()
            .max_connections(options.u32("max_connections")?.unwrap_or(10))
            .min_connections(options.u32("min_connections")?.unwrap_or(0))
            .idle_timeout(options.millis("idle_timeout_ms")?);
        if let Some(timeout) = options.millis("connect_timeout_ms")? {
            pool_options = pool_options.acquire_timeout(timeout);
        }

        let pool = pool_options
            .connect_with(connect)
            .await
            .map_err(|e| sqlx_error(DbType::MySQL, e))?;

        tracing::debug!(pool_key = %settings.key, host = %settings.host, "MySQL pool connected");
        Ok(Arc::new(MySqlNativePool { pool }))
    }
}

/// Live MySQL pool.
pub struct MySqlNativePool {
    pool: MySqlPool,
}

/// Native MySQL result: either a row set with field metadata or an OK packet.
#[derive(Debug)]
pub(crate) enum MySqlOutcome {
    Rows { rows: Vec<JsonRow>, fields: Vec<String> },
    Ok { affected_rows: u64 },
}

impl MySqlOutcome {
    pub(crate) fn normalize(self) -> QueryResult {
        match self {
            MySqlOutcome::Rows { rows, fields } => QueryResult::from_rows(fields, rows),
            MySqlOutcome::Ok { affected_rows } => QueryResult::affected(affected_rows),
        }
    }
}

impl MySqlNativePool {
    async fn run(&self, sql: &str, params: &[SqlParam]) -> Result<MySqlOutcome, sqlx::Error> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }

        let mut rows = Vec::new();
        let mut fields = Vec::new();
        let mut affected_rows = 0;
        let mut stream = (&self.pool).fetch_many(query);
        while let Some(step) = stream.try_next().await? {
            match step {
                Either::Left(done) => affected_rows += done.rows_affected(),
                Either::Right(row) => {
                    if fields.is_empty() {
                        fields = row.columns().iter().map(|c| c.name().to_string()).collect();
                    }
                    rows.push(convert_row(&row));
                }
            }
        }

        if fields.is_empty() {
            Ok(MySqlOutcome::Ok { affected_rows })
        } else {
            Ok(MySqlOutcome::Rows { rows, fields })
        }
    }
}

#[async_trait]
impl NativePool for MySqlNativePool {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> AppResult<QueryResult> {
        self.run(sql, params)
            .await
            .map(MySqlOutcome::normalize)
            .map_err(|e| sqlx_error(DbType::MySQL, e))
    }

    async fn close(&self) -> AppResult<()> {
        self.pool.close().await;
        Ok(())
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            size: self.pool.size(),
            idle: self.pool.num_idle() as u32,
            max_size: self.pool.options().get_max_connections(),
        }
    }
}

fn bind_param<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    param: &'q SqlParam,
) -> Query<'q, MySql, MySqlArguments> {
    match param {
        SqlParam::Null => query.bind(None::<String>),
        SqlParam::Bool(b) => query.bind(*b),
        SqlParam::Int(i) => query.bind(*i),
        SqlParam::Float(f) => query.bind(*f),
        SqlParam::Text(s) => query.bind(s.as_str()),
        SqlParam::Json(v) => query.bind(Json(v)),
    }
}

fn convert_row(row: &MySqlRow) -> JsonRow {
    row.columns()
        .iter()
        .map(|column| {
            let value = convert_value(row, column.ordinal(), column.type_info().name());
            (column.name().to_string(), value)
        })
        .collect()
}

fn convert_value(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    let decoded: Result<Option<Value>, sqlx::Error> = match type_name {
        "BOOLEAN" => row.try_get::<Option<bool>, _>(index).map(|v| v.map(Value::from)),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            row.try_get::<Option<i64>, _>(index).map(|v| v.map(Value::from))
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" | "YEAR" => {
            row.try_get::<Option<u64>, _>(index).map(|v| v.map(Value::from))
        }
        "FLOAT" => row
            .try_get::<Option<f32>, _>(index)
            .map(|v| v.map(|f| Value::from(f64::from(f)))),
        "DOUBLE" => row.try_get::<Option<f64>, _>(index).map(|v| v.map(Value::from)),
        "DECIMAL" => row
            .try_get::<Option<Decimal>, _>(index)
            .map(|v| v.map(|d| Value::String(d.to_string()))),
        "JSON" => row.try_get::<Option<Value>, _>(index),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)
            .map(|v| v.map(|t| Value::String(t.to_string()))),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)
            .map(|v| v.map(|d| Value::String(d.to_string()))),
        "TIME" => row
            .try_get::<Option<chrono::NaiveTime>, _>(index)
            .map(|v| v.map(|t| Value::String(t.to_string()))),
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .map(|v| v.map(|b| Value::String(bytes_to_hex(&b)))),
        _ => row.try_get::<Option<String>, _>(index).map(|v| v.map(Value::String)),
    };

    match decoded {
        Ok(value) => value.unwrap_or(Value::Null),
        Err(_) => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

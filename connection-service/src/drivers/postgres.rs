//! PostgreSQL adapter (sqlx).

use std::sync::Arc;

use async_trait::async_trait;
use common::errors::AppResult;
use common::models::{DbType, JsonRow, PoolStatus, QueryResult, SqlParam};
use futures::TryStreamExt;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow, PgSslMode};
use sqlx::query::Query;
use sqlx::types::{Decimal, Json, Uuid};
use sqlx::{Column, Either, Executor, PgPool, Postgres, Row, TypeInfo};

use super::{bytes_to_hex, sqlx_error, DriverAdapter, NativePool, PoolErrorListener, PoolSettings};

/// Options accepted on top of the common ones.
const POSTGRES_OPTIONS: &[&str] = &["application_name", "statement_timeout_ms"];

/// PostgreSQL adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresAdapter;

#[async_trait]
impl DriverAdapter for PostgresAdapter {
    fn db_type(&self) -> DbType {
        DbType::Postgres
    }

    fn allowed_options(&self) -> &'static [&'static str] {
        POSTGRES_OPTIONS
    }

    fn version_query(&self) -> &'static str {
        "SELECT version()"
    }

    async fn create_pool(
        &self,
        settings: &PoolSettings,
        _listener: PoolErrorListener,
    ) -> AppResult<Arc<dyn NativePool>> {
        let options = &settings.options;
        let ssl_mode = if options.bool("ssl")?.unwrap_or(false) {
            PgSslMode::Require
        } else {
            PgSslMode::Disable
        };

        let mut connect = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .database(&settings.database)
            .username(&settings.username)
            .password(&settings.password)
            .ssl_mode(ssl_mode);
        if let Some(name) = options.str("application_name")? {
            connect = connect.application_name(name);
        }
        if let Some(timeout) = options.u64("statement_timeout_ms")? {
            connect = connect.options([("statement_timeout", timeout.to_string())]);
        }

        let mut pool_options = PgPoolOptions::new()
            .max_connections(options.u32("max_connections")?.unwrap_or(10))
            .min_connections(options.u32("min_connections")?.unwrap_or(0))
            .idle_timeout(options.millis("idle_timeout_ms")?);
        if let Some(timeout) = options.millis("connect_timeout_ms")? {
            pool_options = pool_options.acquire_timeout(timeout);
        }

        let pool = pool_options
            .connect_with(connect)
            .await
            .map_err(|e| sqlx_error(DbType::Postgres, e))?;

        tracing::debug!(pool_key = %settings.key, host = %settings.host, "PostgreSQL pool connected");
        Ok(Arc::new(PostgresPool { pool }))
    }
}

/// Live PostgreSQL pool.
pub struct PostgresPool {
    pool: PgPool,
}

/// Shape of a native PostgreSQL result: field list, row list and command count.
#[derive(Debug, Default)]
pub(crate) struct PgOutcome {
    pub(crate) fields: Vec<String>,
    pub(crate) rows: Vec<JsonRow>,
    pub(crate) row_count: u64,
}

impl PgOutcome {
    pub(crate) fn normalize(self) -> QueryResult {
        if self.fields.is_empty() {
            QueryResult::affected(self.row_count)
        } else {
            QueryResult::from_rows(self.fields, self.rows)
        }
    }
}

impl PostgresPool {
    async fn run(&self, sql: &str, params: &[SqlParam]) -> Result<PgOutcome, sqlx::Error> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }

        let mut outcome = PgOutcome::default();
        let mut stream = (&self.pool).fetch_many(query);
        while let Some(step) = stream.try_next().await? {
            match step {
                Either::Left(done) => outcome.row_count += done.rows_affected(),
                Either::Right(row) => {
                    if outcome.fields.is_empty() {
                        outcome.fields = row.columns().iter().map(|c| c.name().to_string()).collect();
                    }
                    outcome.rows.push(convert_row(&row));
                }
            }
        }
        Ok(outcome)
    }
}

#[async_trait]
impl NativePool for PostgresPool {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> AppResult<QueryResult> {
        self.run(sql, params)
            .await
            .map(PgOutcome::normalize)
            .map_err(|e| sqlx_error(DbType::Postgres, e))
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
    query: Query<'q, Postgres, PgArguments>,
    param: &'q SqlParam,
) -> Query<'q, Postgres, PgArguments> {
    match param {
        SqlParam::Null => query.bind(None::<i32>),
        SqlParam::Bool(b) => query.bind(*b),
        SqlParam::Int(i) => query.bind(*i),
        SqlParam::Float(f) => query.bind(*f),
        SqlParam::Text(s) => query.bind(s.as_str()),
        SqlParam::Json(v) => query.bind(Json(v)),
    }
}

fn convert_row(row: &PgRow) -> JsonRow {
    row.columns()
        .iter()
        .map(|column| {
            let value = convert_value(row, column.ordinal(), column.type_info().name());
            (column.name().to_string(), value)
        })
        .collect()
}

fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    let decoded: Result<Option<Value>, sqlx::Error> = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index).map(|v| v.map(Value::from)),
        "INT2" => row.try_get::<Option<i16>, _>(index).map(|v| v.map(Value::from)),
        "INT4" => row.try_get::<Option<i32>, _>(index).map(|v| v.map(Value::from)),
        "INT8" => row.try_get::<Option<i64>, _>(index).map(|v| v.map(Value::from)),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)
            .map(|v| v.map(|f| Value::from(f64::from(f)))),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index).map(|v| v.map(Value::from)),
        "NUMERIC" => row
            .try_get::<Option<Decimal>, _>(index)
            .map(|v| v.map(|d| Value::String(d.to_string()))),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(index),
        "UUID" => row
            .try_get::<Option<Uuid>, _>(index)
            .map(|v| v.map(|u| Value::String(u.to_string()))),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)
            .map(|v| v.map(|t| Value::String(t.to_rfc3339()))),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)
            .map(|v| v.map(|t| Value::String(t.to_string()))),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)
            .map(|v| v.map(|d| Value::String(d.to_string()))),
        "TIME" => row
            .try_get::<Option<chrono::NaiveTime>, _>(index)
            .map(|v| v.map(|t| Value::String(t.to_string()))),
        "BYTEA" => row
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> JsonRow {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_select_normalizes_to_rows() {
        let outcome = PgOutcome {
            fields: vec!["id".into(), "name".into()],
            rows: vec![
                row(&[("id", json!(1)), ("name", json!("a"))]),
                row(&[("id", json!(2)), ("name", json!("b"))]),
            ],
            row_count: 2,
        };
        let result = outcome.normalize();
        assert_eq!(result.columns, vec!["id", "name"]);
        assert_eq!(result.row_count, 2);
        assert_eq!(result.row_count as usize, result.rows.len());
    }

    #[test]
    fn test_command_normalizes_to_affected_count() {
        let outcome = PgOutcome {
            row_count: 4,
            ..PgOutcome::default()
        };
        let result = outcome.normalize();
        assert!(result.rows.is_empty());
        assert!(result.columns.is_empty());
        assert_eq!(result.row_count, 4);
    }

    #[test]
    fn test_adapter_options() {
        assert!(PostgresAdapter.allowed_options().contains(&"statement_timeout_ms"));
        assert!(!PostgresAdapter.allowed_options().contains(&"charset"));
        assert_eq!(PostgresAdapter.health_query(), "SELECT 1 as test");
    }
}

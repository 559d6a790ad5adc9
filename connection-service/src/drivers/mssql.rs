//! SQL Server adapter (tiberius over a bb8 pool).
//!
//! Unlike the sqlx pools, bb8 exposes an error sink, so background connection
//! failures reach the registry through the [`PoolErrorListener`].

use std::borrow::Cow;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bb8::{ErrorSink, ManageConnection, Pool, RunError};
use common::errors::{AppError, AppResult};
use common::models::{
    ConnectionConfig, DbType, JsonRow, OptionMap, PoolStatus, QueryResult, SqlParam,
};
use serde_json::{json, Value};
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, FromSql, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::options::base_defaults;
use super::placeholder::positional_to_named;
use super::{bytes_to_hex, DriverAdapter, NativePool, PoolErrorListener, PoolSettings};

const MSSQL_OPTIONS: &[&str] = &[
    "encrypt",
    "trust_server_certificate",
    "application_name",
    "instance_name",
];

/// SQL Server adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlAdapter;

#[async_trait]
impl DriverAdapter for MssqlAdapter {
    fn db_type(&self) -> DbType {
        DbType::Mssql
    }

    fn allowed_options(&self) -> &'static [&'static str] {
        MSSQL_OPTIONS
    }

    fn default_options(&self, config: &ConnectionConfig) -> OptionMap {
        let mut defaults = base_defaults(config);
        defaults.insert("encrypt".into(), json!(config.enable_ssl));
        defaults.insert("trust_server_certificate".into(), json!(true));
        defaults
    }

    fn version_query(&self) -> &'static str {
        "SELECT @@VERSION as version"
    }

    async fn create_pool(
        &self,
        settings: &PoolSettings,
        listener: PoolErrorListener,
    ) -> AppResult<Arc<dyn NativePool>> {
        let options = &settings.options;

        let mut config = Config::new();
        config.host(&settings.host);
        config.port(settings.port);
        config.database(&settings.database);
        config.authentication(AuthMethod::sql_server(&settings.username, &settings.password));
        let encrypt =
            options.bool("encrypt")?.unwrap_or(false) || options.bool("ssl")?.unwrap_or(false);
        config.encryption(if encrypt {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::NotSupported
        });
        if options.bool("trust_server_certificate")?.unwrap_or(true) {
            config.trust_cert();
        }
        if let Some(name) = options.str("application_name")? {
            config.application_name(name);
        }
        if let Some(instance) = options.str("instance_name")? {
            config.instance_name(instance);
        }

        let connect_timeout = options
            .millis("connect_timeout_ms")?
            .unwrap_or(Duration::from_secs(30));
        let max_size = options.u32("max_connections")?.unwrap_or(10);
        let min_idle = options.u32("min_connections")?.filter(|n| *n > 0);

        let manager = TiberiusManager {
            config,
            connect_timeout,
        };
        let pool = Pool::builder()
            .max_size(max_size)
            .min_idle(min_idle)
            .idle_timeout(options.millis("idle_timeout_ms")?)
            .connection_timeout(connect_timeout)
            .error_sink(Box::new(ListenerSink(listener)))
            .build(manager)
            .await
            .map_err(tiberius_error)?;

        // bb8 connects lazily; check out one connection so bad credentials
        // fail here instead of on the first query.
        drop(pool.get().await.map_err(run_error)?);

        tracing::debug!(pool_key = %settings.key, host = %settings.host, "SQL Server pool connected");
        Ok(Arc::new(MssqlPool::new(pool, max_size)))
    }
}

/// bb8 connection manager for tiberius clients.
#[derive(Debug)]
pub struct TiberiusManager {
    config: Config,
    connect_timeout: Duration,
}

#[async_trait]
impl ManageConnection for TiberiusManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let addr = self.config.get_addr();
        let tcp = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))??;
        tcp.set_nodelay(true)?;
        Client::connect(self.config.clone(), tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Forwards bb8 background errors to the registry listener.
#[derive(Debug, Clone)]
struct ListenerSink(PoolErrorListener);

impl ErrorSink<tiberius::error::Error> for ListenerSink {
    fn sink(&self, error: tiberius::error::Error) {
        tracing::warn!(error = %error, "SQL Server pool error");
        self.0.report(error.to_string());
    }

    fn boxed_clone(&self) -> Box<dyn ErrorSink<tiberius::error::Error>> {
        Box::new(self.clone())
    }
}

/// Live SQL Server pool.
///
/// bb8 has no shutdown call; its connections are released when the last
/// clone of the pool drops. `close` drops this handle's clone, so new queries
/// fail at once and the connections go away as in-flight queries finish.
pub struct MssqlPool {
    pool: Mutex<Option<Pool<TiberiusManager>>>,
    max_size: u32,
}

/// Native SQL Server result: the first record set.
#[derive(Debug, Default)]
pub(crate) struct MssqlOutcome {
    pub(crate) recordset: Vec<JsonRow>,
}

impl MssqlOutcome {
    /// tiberius' query stream carries no DONE row counts, so statements
    /// without a result set (INSERT, UPDATE, DELETE without OUTPUT) report
    /// `row_count` 0 here.
    pub(crate) fn normalize(self) -> QueryResult {
        let columns = self
            .recordset
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();
        QueryResult::from_rows(columns, self.recordset)
    }
}

impl MssqlPool {
    fn new(pool: Pool<TiberiusManager>, max_size: u32) -> Self {
        Self {
            pool: Mutex::new(Some(pool)),
            max_size,
        }
    }

    fn live_pool(&self) -> AppResult<Pool<TiberiusManager>> {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| AppError::driver(DbType::Mssql, "connection error: pool closed"))
    }

    async fn run(&self, sql: &str, params: &[SqlParam]) -> AppResult<MssqlOutcome> {
        let sql = if params.is_empty() {
            Cow::Borrowed(sql)
        } else {
            positional_to_named(sql)
        };

        let mut query = tiberius::Query::new(sql);
        for param in params {
            match param {
                SqlParam::Null => query.bind(None::<String>),
                SqlParam::Bool(b) => query.bind(*b),
                SqlParam::Int(i) => query.bind(*i),
                SqlParam::Float(f) => query.bind(*f),
                SqlParam::Text(s) => query.bind(s.clone()),
                SqlParam::Json(v) => query.bind(v.to_string()),
            }
        }

        let pool = self.live_pool()?;
        let mut conn = pool.get().await.map_err(run_error)?;
        let rows = query
            .query(&mut *conn)
            .await
            .map_err(tiberius_error)?
            .into_first_result()
            .await
            .map_err(tiberius_error)?;

        Ok(MssqlOutcome {
            recordset: rows.iter().map(convert_row).collect(),
        })
    }
}

#[async_trait]
impl NativePool for MssqlPool {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> AppResult<QueryResult> {
        self.run(sql, params).await.map(MssqlOutcome::normalize)
    }

    async fn close(&self) -> AppResult<()> {
        let released = self.pool.lock().unwrap_or_else(PoisonError::into_inner).take();
        if released.is_none() {
            tracing::debug!("SQL Server pool already closed");
        }
        Ok(())
    }

    fn status(&self) -> PoolStatus {
        let pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner).clone();
        match pool {
            Some(pool) => {
                let state = pool.state();
                PoolStatus {
                    size: state.connections,
                    idle: state.idle_connections,
                    max_size: self.max_size,
                }
            }
            None => PoolStatus {
                max_size: self.max_size,
                ..PoolStatus::default()
            },
        }
    }
}

fn convert_row(row: &Row) -> JsonRow {
    row.cells()
        .map(|(column, data)| (column.name().to_string(), convert_value(data)))
        .collect()
}

fn convert_value(data: &ColumnData<'static>) -> Value {
    match data {
        ColumnData::U8(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I16(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I32(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I64(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::F32(v) => v.map(|f| Value::from(f64::from(f))).unwrap_or(Value::Null),
        ColumnData::F64(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::Bit(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::String(v) => v
            .as_ref()
            .map(|s| Value::String(s.to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Guid(v) => v
            .as_ref()
            .map(|g| Value::String(g.to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Numeric(v) => v
            .as_ref()
            .map(|n| Value::String(n.to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Binary(v) => v
            .as_ref()
            .map(|b| Value::String(bytes_to_hex(b)))
            .unwrap_or(Value::Null),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            decode_temporal::<chrono::NaiveDateTime>(data, |t| t.to_string())
        }
        ColumnData::Date(_) => decode_temporal::<chrono::NaiveDate>(data, |d| d.to_string()),
        ColumnData::Time(_) => decode_temporal::<chrono::NaiveTime>(data, |t| t.to_string()),
        ColumnData::DateTimeOffset(_) => {
            decode_temporal::<chrono::DateTime<chrono::FixedOffset>>(data, |t| t.to_rfc3339())
        }
        _ => Value::Null,
    }
}

fn decode_temporal<'a, T>(data: &'a ColumnData<'static>, render: impl Fn(T) -> String) -> Value
where
    T: FromSql<'a>,
{
    match T::from_sql(data) {
        Ok(Some(value)) => Value::String(render(value)),
        _ => Value::Null,
    }
}

fn tiberius_error(err: tiberius::error::Error) -> AppError {
    match &err {
        tiberius::error::Error::Io { .. } | tiberius::error::Error::Tls(_) => {
            AppError::driver(DbType::Mssql, format!("connection error: {}", err))
        }
        _ => AppError::driver(DbType::Mssql, err.to_string()),
    }
}

fn run_error(err: RunError<tiberius::error::Error>) -> AppError {
    match err {
        RunError::User(err) => tiberius_error(err),
        RunError::TimedOut => AppError::driver(
            DbType::Mssql,
            "connection error: timed out waiting for a pooled connection",
        ),
    }
}

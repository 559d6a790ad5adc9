//! In-memory adapter used by the registry and executor tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::errors::{AppError, AppResult};
use common::models::{DbType, JsonRow, PoolStatus, QueryResult, SqlParam};
use serde_json::json;

use super::mssql::MssqlOutcome;
use super::mysql::MySqlOutcome;
use super::postgres::PgOutcome;
use super::{DriverAdapter, NativePool, PoolErrorListener, PoolSettings, HEALTH_QUERY};

pub const FAKE_VERSION_QUERY: &str = "SELECT 'fake' as version";

/// Statements starting with this prefix report [`FAKE_AFFECTED_ROWS`] instead of rows.
pub const FAKE_UPDATE_PREFIX: &str = "UPDATE";
pub const FAKE_AFFECTED_ROWS: u64 = 3;

/// How long a scripted pool failure takes to surface.
pub const FAKE_FAILURE_DELAY: Duration = Duration::from_millis(20);

#[derive(Default)]
struct FakeState {
    constructions: AtomicUsize,
    closes: AtomicUsize,
    closed_serials: Mutex<Vec<usize>>,
    failing_pool: Mutex<Option<(usize, String)>>,
    unhealthy: AtomicBool,
    fail_close: AtomicBool,
    connect_error: Mutex<Option<String>>,
    query_error: Mutex<Option<String>>,
    listeners: Mutex<Vec<PoolErrorListener>>,
    last_settings: Mutex<Option<PoolSettings>>,
    last_query: Mutex<Option<String>>,
}

/// Adapter double. Clones share state, so a test keeps one clone for
/// inspection and registers another.
#[derive(Clone)]
pub struct FakeAdapter {
    db_type: DbType,
    state: Arc<FakeState>,
}

impl FakeAdapter {
    pub fn new(db_type: DbType) -> Self {
        Self {
            db_type,
            state: Arc::default(),
        }
    }

    pub fn constructions(&self) -> usize {
        self.state.constructions.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.state.unhealthy.store(unhealthy, Ordering::SeqCst);
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.state.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn set_connect_error(&self, message: Option<&str>) {
        *self.state.connect_error.lock().unwrap() = message.map(str::to_string);
    }

    pub fn set_query_error(&self, message: Option<&str>) {
        *self.state.query_error.lock().unwrap() = message.map(str::to_string);
    }

    /// Serials of the pools closed so far, in close order.
    pub fn closed_serials(&self) -> Vec<usize> {
        self.state.closed_serials.lock().unwrap().clone()
    }

    /// Makes every query except the health check on pool `serial` fail with `message` after
    /// [`FAKE_FAILURE_DELAY`]. Other pools keep working.
    pub fn fail_pool(&self, serial: usize, message: &str) {
        *self.state.failing_pool.lock().unwrap() = Some((serial, message.to_string()));
    }

    /// Listener handed to the most recently built pool.
    pub fn last_listener(&self) -> Option<PoolErrorListener> {
        self.state.listeners.lock().unwrap().last().cloned()
    }

    pub fn last_settings(&self) -> Option<PoolSettings> {
        self.state.last_settings.lock().unwrap().clone()
    }

    pub fn last_query(&self) -> Option<String> {
        self.state.last_query.lock().unwrap().clone()
    }
}

#[async_trait]
impl DriverAdapter for FakeAdapter {
    fn db_type(&self) -> DbType {
        self.db_type
    }

    fn allowed_options(&self) -> &'static [&'static str] {
        &["application_name"]
    }

    fn version_query(&self) -> &'static str {
        FAKE_VERSION_QUERY
    }

    async fn create_pool(
        &self,
        settings: &PoolSettings,
        listener: PoolErrorListener,
    ) -> AppResult<Arc<dyn NativePool>> {
        // Give concurrent callers a chance to interleave.
        tokio::task::yield_now().await;

        let connect_error = self.state.connect_error.lock().unwrap().clone();
        if let Some(message) = connect_error {
            return Err(AppError::driver(self.db_type, message));
        }

        let serial = self.state.constructions.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.listeners.lock().unwrap().push(listener);
        *self.state.last_settings.lock().unwrap() = Some(settings.clone());

        Ok(Arc::new(FakePool {
            db_type: self.db_type,
            serial,
            state: self.state.clone(),
        }))
    }
}

/// Pool double; each instance carries the serial of its construction.
pub struct FakePool {
    db_type: DbType,
    serial: usize,
    state: Arc<FakeState>,
}

#[async_trait]
impl NativePool for FakePool {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> AppResult<QueryResult> {
        *self.state.last_query.lock().unwrap() = Some(sql.to_string());

        if sql == HEALTH_QUERY {
            if self.state.unhealthy.load(Ordering::SeqCst) {
                return Err(AppError::driver(
                    self.db_type,
                    "connection error: server closed the connection unexpectedly",
                ));
            }
            return Ok(self.rows(json!({ "test": 1 })));
        }

        let failing_pool = self.state.failing_pool.lock().unwrap().clone();
        if let Some((serial, message)) = failing_pool {
            if serial == self.serial {
                tokio::time::sleep(FAKE_FAILURE_DELAY).await;
                return Err(AppError::driver(self.db_type, message));
            }
        }

        if let Some(message) = self.state.query_error.lock().unwrap().clone() {
            return Err(AppError::driver(self.db_type, message));
        }

        if sql == FAKE_VERSION_QUERY {
            return Ok(self.rows(json!({ "version": "FakeDB 1.0" })));
        }

        if sql.starts_with(FAKE_UPDATE_PREFIX) {
            return Ok(self.affected(FAKE_AFFECTED_ROWS));
        }

        Ok(self.rows(json!({
            "serial": self.serial,
            "params": params.len(),
        })))
    }

    async fn close(&self) -> AppResult<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        self.state.closed_serials.lock().unwrap().push(self.serial);
        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(AppError::driver(self.db_type, "pool already ended"));
        }
        Ok(())
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            size: 1,
            idle: 1,
            max_size: 10,
        }
    }
}

impl FakePool {
    /// One row, normalized through the native shape of the pool's protocol.
    fn rows(&self, row: serde_json::Value) -> QueryResult {
        let row: JsonRow = match row {
            serde_json::Value::Object(map) => map,
            _ => JsonRow::new(),
        };
        match self.db_type {
            DbType::Postgres => PgOutcome {
                fields: row.keys().cloned().collect(),
                rows: vec![row],
                row_count: 1,
            }
            .normalize(),
            DbType::MySQL => MySqlOutcome::Rows {
                fields: row.keys().cloned().collect(),
                rows: vec![row],
            }
            .normalize(),
            DbType::Mssql => MssqlOutcome {
                recordset: vec![row],
            }
            .normalize(),
        }
    }

    /// A statement without a result set, as each protocol reports it.
    fn affected(&self, count: u64) -> QueryResult {
        match self.db_type {
            DbType::Postgres => PgOutcome {
                row_count: count,
                ..PgOutcome::default()
            }
            .normalize(),
            DbType::MySQL => MySqlOutcome::Ok {
                affected_rows: count,
            }
            .normalize(),
            DbType::Mssql => MssqlOutcome::default().normalize(),
        }
    }
}

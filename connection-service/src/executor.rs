//! Query executor.
//!
//! Runs queries against registered connections. A connection-level failure
//! triggers one pool rebuild so the next call starts from a fresh pool; the
//! failing call still returns its original error.

use std::time::Instant;

use common::errors::AppResult;
use common::models::{ConnectionTestResult, PoolSnapshot, QueryResult, SqlParam};
use serde_json::Value;

use crate::classifier::is_connection_error;
use crate::registry::PoolRegistry;

/// Facade exposed to the HTTP layer.
#[derive(Clone)]
pub struct QueryExecutor {
    registry: PoolRegistry,
}

impl QueryExecutor {
    pub fn new(registry: PoolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &PoolRegistry {
        &self.registry
    }

    /// Executes `query` against connection `id`.
    ///
    /// Fails with `ConnectionNotFound` / `ConnectionInactive` before any pool
    /// is touched. Driver failures are returned unchanged; when one looks like
    /// a lost connection the pool is rebuilt first.
    pub async fn execute(
        &self,
        id: &str,
        query: &str,
        params: &[SqlParam],
    ) -> AppResult<QueryResult> {
        let handle = self.registry.get_pool(id).await?;

        let started = Instant::now();
        match handle.execute(query, params).await {
            Ok(mut result) => {
                result.execution_time_ms = started.elapsed().as_millis() as u64;
                tracing::debug!(
                    connection_id = id,
                    pool_key = %handle.key(),
                    row_count = result.row_count,
                    elapsed_ms = result.execution_time_ms,
                    "Query executed"
                );
                Ok(result)
            }
            Err(e) => {
                tracing::error!(
                    connection_id = id,
                    pool_key = %handle.key(),
                    error = %e,
                    "Query execution failed"
                );
                if is_connection_error(&e) {
                    tracing::warn!(connection_id = id, "Connection-level failure, rebuilding pool");
                    if self.registry.reconnect_if_current(&handle).await.is_err() {
                        tracing::warn!(
                            connection_id = id,
                            "Pool could not be rebuilt; the next call will try again"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    /// Builds a pool if needed and runs the server-version query. Never fails:
    /// every error ends up in the returned summary.
    pub async fn test_connection(&self, id: &str) -> ConnectionTestResult {
        let name = match self.registry.store().find_by_id(id).await {
            Ok(Some(config)) => config.name,
            _ => "Unknown".to_string(),
        };

        match self.fetch_version(id).await {
            Ok(version) => {
                tracing::info!(connection_id = id, "Connection test succeeded");
                ConnectionTestResult::connected(name, version)
            }
            Err(e) => {
                tracing::warn!(connection_id = id, error = %e, "Connection test failed");
                ConnectionTestResult::failed(name, e.to_string())
            }
        }
    }

    async fn fetch_version(&self, id: &str) -> AppResult<Option<Value>> {
        let handle = self.registry.create_pool(id).await?;
        let adapter = self.registry.adapter(handle.key().db_type)?;
        let result = self.execute(id, adapter.version_query(), &[]).await?;
        Ok(result.rows.into_iter().next().map(Value::Object))
    }

    /// Drops the pools of a configuration that changed or was deleted.
    pub async fn close_pool(&self, id: &str) {
        self.registry.close_pool(id).await;
    }

    /// Shutdown hook.
    pub async fn close_all_pools(&self) {
        self.registry.close_all().await;
    }

    pub async fn pool_snapshots(&self) -> Vec<PoolSnapshot> {
        self.registry.snapshots().await
    }
}

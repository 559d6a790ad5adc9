//! Pool health checks.

use crate::drivers::DriverAdapter;
use crate::registry::PoolHandle;

/// Checks a cached pool before it is handed out again.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthChecker;

impl HealthChecker {
    /// Runs the adapter's health query against the pool.
    ///
    /// Any returned row counts as healthy. Failures are logged and reported as
    /// unhealthy, never as errors.
    pub async fn is_healthy(&self, handle: &PoolHandle, adapter: &dyn DriverAdapter) -> bool {
        match handle.pool().execute(adapter.health_query(), &[]).await {
            Ok(result) => !result.rows.is_empty(),
            Err(e) => {
                tracing::warn!(pool_key = %handle.key(), error = %e, "Pool health check failed");
                false
            }
        }
    }
}

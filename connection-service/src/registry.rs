//! Pool registry.
//!
//! Owns every live native pool, keyed by `(protocol, connection id)`. The
//! registry is the only place the pool map is mutated. Creation is serialized
//! per key, so concurrent first access to a connection builds exactly one
//! pool. Asynchronous pool faults schedule one delayed rebuild per key; those
//! tasks run on a tracker and are cancelled by [`PoolRegistry::close_all`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::errors::{AppError, AppResult};
use common::models::{ConnectionConfig, DbType, PoolKey, PoolSnapshot, QueryResult, SqlParam};
use futures::future::join_all;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use validator::Validate;

use crate::drivers::{
    options, AdapterTable, DriverAdapter, NativePool, PoolErrorListener, PoolSettings,
    ResolvedOptions,
};
use crate::health::HealthChecker;
use crate::store::ConnectionStore;

/// A tracked native pool plus the metadata it was built with.
pub struct PoolHandle {
    key: PoolKey,
    generation: u64,
    pool: Arc<dyn NativePool>,
    options: ResolvedOptions,
    created_at: DateTime<Utc>,
}

impl PoolHandle {
    pub fn new(
        key: PoolKey,
        generation: u64,
        pool: Arc<dyn NativePool>,
        options: ResolvedOptions,
    ) -> Self {
        Self {
            key,
            generation,
            pool,
            options,
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    /// Identifies this pool instance; every build gets a new generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pool(&self) -> &Arc<dyn NativePool> {
        &self.pool
    }

    pub fn options(&self) -> &ResolvedOptions {
        &self.options
    }

    pub async fn execute(&self, sql: &str, params: &[SqlParam]) -> AppResult<QueryResult> {
        self.pool.execute(sql, params).await
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            key: self.key.to_string(),
            connection_id: self.key.connection_id.clone(),
            db_type: self.key.db_type,
            generation: self.generation,
            created_at: self.created_at,
            options: self.options.as_map().clone(),
            status: self.pool.status(),
        }
    }
}

/// Cheaply clonable handle to the shared registry state.
#[derive(Clone)]
pub struct PoolRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    store: Arc<dyn ConnectionStore>,
    adapters: AdapterTable,
    health: HealthChecker,
    pools: RwLock<HashMap<PoolKey, Arc<PoolHandle>>>,
    creation_locks: Mutex<HashMap<PoolKey, Arc<tokio::sync::Mutex<()>>>>,
    pending_reconnects: Mutex<HashSet<PoolKey>>,
    next_generation: AtomicU64,
    reconnect_delay: Duration,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PoolRegistry {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        adapters: AdapterTable,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                store,
                adapters,
                health: HealthChecker,
                pools: RwLock::new(HashMap::new()),
                creation_locks: Mutex::new(HashMap::new()),
                pending_reconnects: Mutex::new(HashSet::new()),
                next_generation: AtomicU64::new(0),
                reconnect_delay,
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn ConnectionStore> {
        &self.inner.store
    }

    /// Adapter registered for `db_type`.
    pub fn adapter(&self, db_type: DbType) -> AppResult<Arc<dyn DriverAdapter>> {
        self.inner.adapters.get(db_type)
    }

    /// Looks up an active configuration (non-privileged projection).
    pub async fn active_config(&self, id: &str) -> AppResult<ConnectionConfig> {
        let config = self
            .inner
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::ConnectionNotFound(id.to_string()))?;
        if !config.is_active {
            return Err(AppError::ConnectionInactive(id.to_string()));
        }
        Ok(config)
    }

    /// Returns a usable pool for `id`, reusing the cached one when it passes
    /// a health check and building a new one otherwise.
    pub async fn get_pool(&self, id: &str) -> AppResult<Arc<PoolHandle>> {
        let config = self.active_config(id).await?;
        let key = PoolKey::new(config.db_type, id);

        let cached = self.inner.pools.read().await.get(&key).cloned();
        if let Some(handle) = cached {
            let adapter = self.adapter(config.db_type)?;
            if self.inner.health.is_healthy(&handle, adapter.as_ref()).await {
                return Ok(handle);
            }

            tracing::warn!(
                pool_key = %key,
                generation = handle.generation(),
                "Evicting unhealthy pool"
            );
            if let Some(stale) = self.evict_if_current(&key, handle.generation()).await {
                close_handle(&stale).await;
            }
        }

        self.create_pool(id).await
    }

    /// Builds and registers a pool for `id` unless one is already tracked.
    pub async fn create_pool(&self, id: &str) -> AppResult<Arc<PoolHandle>> {
        let secret = self
            .inner
            .store
            .find_by_id_with_secret(id)
            .await?
            .ok_or_else(|| AppError::ConnectionNotFound(id.to_string()))?;
        let config = &secret.config;
        let key = PoolKey::new(config.db_type, id);

        let creation_lock = self.creation_lock(&key);
        let _guard = creation_lock.lock().await;

        // Another caller may have finished building while we waited.
        let existing = self.inner.pools.read().await.get(&key).cloned();
        if let Some(existing) = existing {
            return Ok(existing);
        }

        config.validate()?;
        let adapter = self.adapter(config.db_type)?;
        let resolved = options::resolve(adapter.as_ref(), config)?;
        let settings = PoolSettings::new(&secret, resolved.clone());

        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let listener = self.error_listener(key.clone(), generation);

        let pool = adapter.create_pool(&settings, listener).await.map_err(|e| {
            tracing::error!(pool_key = %key, connection_id = id, error = %e, "Failed to create pool");
            e
        })?;

        let handle = Arc::new(PoolHandle::new(key.clone(), generation, pool, resolved));
        self.inner.pools.write().await.insert(key.clone(), handle.clone());
        tracing::info!(
            pool_key = %key,
            connection_id = id,
            db_type = %config.db_type,
            generation,
            "Pool created"
        );

        if let Err(e) = self.inner.store.update_last_connected(id).await {
            tracing::warn!(connection_id = id, error = %e, "Failed to record last connection time");
        }

        Ok(handle)
    }

    /// Closes every pool tracked for `id`, whatever its protocol. Close errors
    /// are logged; the handles are always removed.
    pub async fn close_pool(&self, id: &str) {
        let removed: Vec<Arc<PoolHandle>> = {
            let mut pools = self.inner.pools.write().await;
            let keys: Vec<PoolKey> = pools
                .keys()
                .filter(|key| key.connection_id == id)
                .cloned()
                .collect();
            keys.iter().filter_map(|key| pools.remove(key)).collect()
        };
        self.prune_creation_locks();

        if removed.is_empty() {
            tracing::debug!(connection_id = id, "No pool to close");
            return;
        }
        for handle in removed {
            close_handle(&handle).await;
        }
    }

    /// Cancels pending reconnects, then closes every tracked pool concurrently.
    pub async fn close_all(&self) {
        self.inner.shutdown.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;

        let handles: Vec<Arc<PoolHandle>> = self
            .inner
            .pools
            .write()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        let count = handles.len();
        join_all(handles.iter().map(|handle| close_handle(handle))).await;
        lock(&self.inner.creation_locks).clear();

        tracing::info!(count, "All pools closed");
    }

    /// Rebuilds the pool `failed` came from, unless it was already replaced.
    ///
    /// Only the failing generation is evicted. When another caller got there
    /// first, the pool it built is returned untouched.
    pub async fn reconnect_if_current(&self, failed: &PoolHandle) -> AppResult<Arc<PoolHandle>> {
        let key = failed.key();
        match self.evict_if_current(key, failed.generation()).await {
            Some(stale) => close_handle(&stale).await,
            None => tracing::debug!(
                pool_key = %key,
                generation = failed.generation(),
                "Failed pool already replaced"
            ),
        }

        match self.create_pool(&key.connection_id).await {
            Ok(handle) => {
                if handle.generation() != failed.generation() {
                    tracing::info!(
                        pool_key = %key,
                        generation = handle.generation(),
                        "Pool reconnected"
                    );
                }
                Ok(handle)
            }
            Err(e) => {
                tracing::error!(pool_key = %key, error = %e, "Reconnect failed");
                Err(e)
            }
        }
    }

    /// Diagnostics for every tracked pool, ordered by key.
    pub async fn snapshots(&self) -> Vec<PoolSnapshot> {
        let mut snapshots: Vec<PoolSnapshot> = self
            .inner
            .pools
            .read()
            .await
            .values()
            .map(|handle| handle.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.key.cmp(&b.key));
        snapshots
    }

    pub async fn pool_count(&self) -> usize {
        self.inner.pools.read().await.len()
    }

    /// Removes the handle for `key` only if it is still the given generation.
    async fn evict_if_current(&self, key: &PoolKey, generation: u64) -> Option<Arc<PoolHandle>> {
        let mut pools = self.inner.pools.write().await;
        match pools.get(key) {
            Some(handle) if handle.generation() == generation => pools.remove(key),
            _ => None,
        }
    }

    fn creation_lock(&self, key: &PoolKey) -> Arc<tokio::sync::Mutex<()>> {
        lock(&self.inner.creation_locks)
            .entry(key.clone())
            .or_default()
            .clone()
    }

    fn prune_creation_locks(&self) {
        lock(&self.inner.creation_locks)
            .retain(|_, creation_lock| Arc::strong_count(creation_lock) > 1);
    }

    fn error_listener(&self, key: PoolKey, generation: u64) -> PoolErrorListener {
        let registry = Arc::downgrade(&self.inner);
        PoolErrorListener::new(move |reason| {
            if let Some(inner) = registry.upgrade() {
                PoolRegistry { inner }.schedule_reconnect(key.clone(), generation, reason);
            }
        })
    }

    /// Schedules one delayed rebuild of `key`, unless one is already pending
    /// or the registry is shutting down.
    fn schedule_reconnect(&self, key: PoolKey, generation: u64, reason: String) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        if !lock(&self.inner.pending_reconnects).insert(key.clone()) {
            tracing::debug!(pool_key = %key, "Reconnect already scheduled");
            return;
        }

        let delay = self.inner.reconnect_delay;
        tracing::warn!(
            pool_key = %key,
            generation,
            error = %reason,
            delay_ms = delay.as_millis() as u64,
            "Pool error, scheduling reconnect"
        );

        let registry = self.clone();
        let shutdown = self.inner.shutdown.clone();
        self.inner.tasks.spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(pool_key = %key, "Scheduled reconnect cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    registry.reconnect_generation(&key, generation).await;
                }
            }
            lock(&registry.inner.pending_reconnects).remove(&key);
        });
    }

    async fn reconnect_generation(&self, key: &PoolKey, generation: u64) {
        let Some(stale) = self.evict_if_current(key, generation).await else {
            tracing::debug!(pool_key = %key, generation, "Pool already replaced, skipping reconnect");
            return;
        };
        close_handle(&stale).await;

        match self.create_pool(&key.connection_id).await {
            Ok(handle) => tracing::info!(
                pool_key = %key,
                generation = handle.generation(),
                "Pool reconnected after error"
            ),
            Err(e) => tracing::error!(pool_key = %key, error = %e, "Scheduled reconnect failed"),
        }
    }
}

async fn close_handle(handle: &PoolHandle) {
    match handle.pool().close().await {
        Ok(()) => tracing::info!(
            pool_key = %handle.key(),
            generation = handle.generation(),
            "Pool closed"
        ),
        Err(e) => tracing::warn!(pool_key = %handle.key(), error = %e, "Error closing pool"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::fake::FakeAdapter;
    use crate::store::MemoryConnectionStore;
    use async_trait::async_trait;
    use common::models::SecretConnectionConfig;
    use serde_json::json;

    const DELAY: Duration = Duration::from_secs(5);

    fn config(id: &str, db_type: DbType) -> ConnectionConfig {
        ConnectionConfig::new(id, format!("conn-{id}"), db_type, "db.internal", "app", "app")
    }

    async fn setup() -> (PoolRegistry, FakeAdapter, Arc<MemoryConnectionStore>) {
        let store = Arc::new(MemoryConnectionStore::new());
        store
            .insert(SecretConnectionConfig::new(config("1", DbType::Postgres), "pw"))
            .await;
        let adapter = FakeAdapter::new(DbType::Postgres);
        let adapters = AdapterTable::new().with(Arc::new(adapter.clone()));
        let registry = PoolRegistry::new(store.clone(), adapters, DELAY);
        (registry, adapter, store)
    }

    #[tokio::test]
    async fn test_get_pool_reuses_healthy_pool() {
        let (registry, adapter, _) = setup().await;

        let first = registry.get_pool("1").await.unwrap();
        let second = registry.get_pool("1").await.unwrap();

        assert_eq!(first.generation(), second.generation());
        assert_eq!(adapter.constructions(), 1);
        assert_eq!(registry.pool_count().await, 1);
    }

    #[tokio::test]
    async fn test_close_pool_forces_fresh_construction() {
        let (registry, adapter, _) = setup().await;

        let first = registry.get_pool("1").await.unwrap();
        registry.close_pool("1").await;
        assert_eq!(registry.pool_count().await, 0);
        assert_eq!(adapter.closes(), 1);

        let second = registry.get_pool("1").await.unwrap();
        assert_ne!(first.generation(), second.generation());
        assert_eq!(adapter.constructions(), 2);
    }

    #[tokio::test]
    async fn test_close_pool_is_idempotent() {
        let (registry, adapter, _) = setup().await;
        registry.close_pool("1").await;
        registry.close_pool("unknown").await;
        assert_eq!(adapter.closes(), 0);
    }

    #[tokio::test]
    async fn test_close_errors_are_swallowed() {
        let (registry, adapter, _) = setup().await;
        registry.get_pool("1").await.unwrap();
        adapter.set_fail_close(true);

        registry.close_pool("1").await;
        assert_eq!(registry.pool_count().await, 0);
        assert_eq!(adapter.closes(), 1);
    }

    #[tokio::test]
    async fn test_unknown_connection_is_not_found() {
        let (registry, adapter, _) = setup().await;
        let err = registry.get_pool("404").await.err().unwrap();
        assert!(matches!(err, AppError::ConnectionNotFound(ref id) if id == "404"));
        assert_eq!(adapter.constructions(), 0);
    }

    #[tokio::test]
    async fn test_missing_adapter_is_unsupported() {
        let (registry, _, store) = setup().await;
        store
            .insert(SecretConnectionConfig::new(config("2", DbType::Mssql), "pw"))
            .await;
        let err = registry.get_pool("2").await.err().unwrap();
        assert!(matches!(err, AppError::UnsupportedProtocol(_)));
    }

    #[tokio::test]
    async fn test_inactive_connection_is_rejected() {
        let (registry, adapter, store) = setup().await;
        let mut inactive = config("3", DbType::Postgres);
        inactive.is_active = false;
        store.insert(SecretConnectionConfig::new(inactive, "pw")).await;

        let err = registry.get_pool("3").await.err().unwrap();
        assert!(matches!(err, AppError::ConnectionInactive(_)));
        assert_eq!(adapter.constructions(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_first_access_builds_one_pool() {
        let (registry, adapter, _) = setup().await;

        let (a, b, c) = tokio::join!(
            registry.get_pool("1"),
            registry.get_pool("1"),
            registry.create_pool("1"),
        );

        assert_eq!(adapter.constructions(), 1);
        assert_eq!(a.unwrap().generation(), b.unwrap().generation());
        assert_eq!(c.unwrap().generation(), 1);
        assert_eq!(registry.pool_count().await, 1);
    }

    #[tokio::test]
    async fn test_unhealthy_pool_is_replaced() {
        let (registry, adapter, _) = setup().await;
        let first = registry.get_pool("1").await.unwrap();

        adapter.set_unhealthy(true);
        let second = registry.get_pool("1").await.unwrap();

        assert_ne!(first.generation(), second.generation());
        assert_eq!(adapter.constructions(), 2);
        assert_eq!(adapter.closes(), 1);
        assert_eq!(registry.pool_count().await, 1);
    }

    #[tokio::test]
    async fn test_creation_failure_leaves_nothing_tracked() {
        let (registry, adapter, _) = setup().await;
        adapter.set_connect_error(Some("connect ECONNREFUSED 10.0.0.1:5432"));

        let err = registry.get_pool("1").await.err().unwrap();
        assert!(matches!(err, AppError::Driver { .. }));
        assert_eq!(registry.pool_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_options_fail_creation() {
        let (registry, adapter, store) = setup().await;
        let mut bad = config("4", DbType::Postgres);
        bad.options.insert("host".into(), json!("elsewhere"));
        store.insert(SecretConnectionConfig::new(bad, "pw")).await;

        let err = registry.get_pool("4").await.err().unwrap();
        assert!(matches!(err, AppError::InvalidOptions(_)));
        assert_eq!(adapter.constructions(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_validation() {
        let (registry, _, store) = setup().await;
        let mut bad = config("5", DbType::Postgres);
        bad.max_connections = 0;
        store.insert(SecretConnectionConfig::new(bad, "pw")).await;

        let err = registry.get_pool("5").await.err().unwrap();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_merged_options_reach_the_adapter() {
        let (registry, adapter, store) = setup().await;
        let mut tuned = config("6", DbType::Postgres);
        tuned.options.insert("max_connections".into(), json!(2));
        tuned.options.insert("application_name".into(), json!("dashboards"));
        store.insert(SecretConnectionConfig::new(tuned, "s3cret")).await;

        let handle = registry.get_pool("6").await.unwrap();
        let settings = adapter.last_settings().unwrap();
        assert_eq!(settings.password, "s3cret");
        assert_eq!(settings.options.u32("max_connections").unwrap(), Some(2));
        assert_eq!(handle.options().str("application_name").unwrap(), Some("dashboards"));

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.key, "postgres_6");
        assert!(!serde_json::to_string(&snapshot).unwrap().contains("s3cret"));
    }

    #[tokio::test]
    async fn test_successful_creation_stamps_last_connected() {
        let (registry, _, store) = setup().await;
        assert!(store.last_connected("1").await.is_none());
        registry.get_pool("1").await.unwrap();
        assert!(store.last_connected("1").await.is_some());
    }

    struct StampFailingStore(MemoryConnectionStore);

    #[async_trait]
    impl ConnectionStore for StampFailingStore {
        async fn find_by_id(&self, id: &str) -> AppResult<Option<ConnectionConfig>> {
            self.0.find_by_id(id).await
        }

        async fn find_by_id_with_secret(&self, id: &str) -> AppResult<Option<SecretConnectionConfig>> {
            self.0.find_by_id_with_secret(id).await
        }

        async fn update_last_connected(&self, _id: &str) -> AppResult<()> {
            Err(AppError::Store("database is locked".into()))
        }
    }

    #[tokio::test]
    async fn test_stamp_failure_does_not_fail_creation() {
        let inner = MemoryConnectionStore::new();
        inner
            .insert(SecretConnectionConfig::new(config("1", DbType::Postgres), "pw"))
            .await;
        let adapter = FakeAdapter::new(DbType::Postgres);
        let registry = PoolRegistry::new(
            Arc::new(StampFailingStore(inner)),
            AdapterTable::new().with(Arc::new(adapter.clone())),
            DELAY,
        );

        assert!(registry.get_pool("1").await.is_ok());
        assert_eq!(adapter.constructions(), 1);
    }

    #[tokio::test]
    async fn test_close_pool_covers_every_protocol() {
        let store = Arc::new(MemoryConnectionStore::new());
        store
            .insert(SecretConnectionConfig::new(config("1", DbType::Postgres), "pw"))
            .await;
        let pg = FakeAdapter::new(DbType::Postgres);
        let my = FakeAdapter::new(DbType::MySQL);
        let registry = PoolRegistry::new(
            store.clone(),
            AdapterTable::new()
                .with(Arc::new(pg.clone()))
                .with(Arc::new(my.clone())),
            DELAY,
        );

        registry.get_pool("1").await.unwrap();
        // The configuration switches protocol; the old pool is still tracked.
        store
            .insert(SecretConnectionConfig::new(config("1", DbType::MySQL), "pw"))
            .await;
        registry.get_pool("1").await.unwrap();
        assert_eq!(registry.pool_count().await, 2);

        registry.close_pool("1").await;
        assert_eq!(registry.pool_count().await, 0);
        assert_eq!(pg.closes() + my.closes(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_error_schedules_delayed_reconnect() {
        let (registry, adapter, _) = setup().await;
        let first = registry.get_pool("1").await.unwrap();

        let listener = adapter.last_listener().unwrap();
        listener.report("Connection terminated unexpectedly");
        listener.report("Connection terminated unexpectedly");

        tokio::time::sleep(DELAY / 2).await;
        assert_eq!(adapter.constructions(), 1);

        tokio::time::sleep(DELAY).await;
        assert_eq!(adapter.constructions(), 2);
        assert_eq!(adapter.closes(), 1);

        let snapshots = registry.snapshots().await;
        assert_eq!(snapshots.len(), 1);
        assert_ne!(snapshots[0].generation, first.generation());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_error_is_ignored() {
        let (registry, adapter, _) = setup().await;
        registry.get_pool("1").await.unwrap();
        let stale_listener = adapter.last_listener().unwrap();

        registry.close_pool("1").await;
        registry.get_pool("1").await.unwrap();
        assert_eq!(adapter.constructions(), 2);

        stale_listener.report("socket hang up");
        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(adapter.constructions(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_all_cancels_pending_reconnects() {
        let (registry, adapter, _) = setup().await;
        registry.get_pool("1").await.unwrap();

        adapter.last_listener().unwrap().report("read ETIMEDOUT");
        registry.close_all().await;

        assert_eq!(registry.pool_count().await, 0);
        assert_eq!(adapter.closes(), 1);

        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(adapter.constructions(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_replaces_failed_generation() {
        let (registry, adapter, _) = setup().await;
        let first = registry.get_pool("1").await.unwrap();
        let second = registry.reconnect_if_current(&first).await.unwrap();

        assert_ne!(first.generation(), second.generation());
        assert_eq!(adapter.closes(), 1);
        assert_eq!(registry.pool_count().await, 1);
    }

    #[tokio::test]
    async fn test_reconnect_from_stale_handle_keeps_current_pool() {
        let (registry, adapter, _) = setup().await;
        let first = registry.get_pool("1").await.unwrap();
        let second = registry.reconnect_if_current(&first).await.unwrap();

        let again = registry.reconnect_if_current(&first).await.unwrap();
        assert_eq!(again.generation(), second.generation());
        assert_eq!(adapter.constructions(), 2);
        assert_eq!(adapter.closed_serials(), vec![1]);
    }
}

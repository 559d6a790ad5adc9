//! 外部数据库连接管理服务
//!
//! 提供以下功能：
//! - 按连接配置维护 MySQL / PostgreSQL / SQL Server 连接池
//! - 查询执行与结果归一化
//! - 连接测试与断线重建

use std::sync::Arc;

use anyhow::Context;
use common::config::{AppConfig, LogFormat};
use connection_service::drivers::AdapterTable;
use connection_service::executor::QueryExecutor;
use connection_service::registry::PoolRegistry;
use connection_service::routes::create_router;
use connection_service::state::AppState;
use connection_service::store::SqliteConnectionStore;
use connection_service::SERVICE_NAME;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（包括 .env）
    let config = AppConfig::load_with_service(SERVICE_NAME);

    // 初始化日志追踪
    init_tracing(config.log_format);

    // 连接元数据库
    let store = SqliteConnectionStore::connect(&config.database_url)
        .await
        .context("Failed to open bookkeeping database (check DATABASE_URL)")?;
    store.ensure_table().await?;

    let registry = PoolRegistry::new(
        Arc::new(store),
        AdapterTable::with_defaults(),
        config.reconnect_delay(),
    );
    let executor = QueryExecutor::new(registry);
    let state = AppState::new(config.clone(), executor.clone());

    let app = create_router(state);

    // 启动服务
    let addr = config.bind_address();
    info!(service = SERVICE_NAME, address = %addr, "启动服务");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // 关闭所有连接池
    executor.close_all_pools().await;
    info!(service = SERVICE_NAME, "服务已停止");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

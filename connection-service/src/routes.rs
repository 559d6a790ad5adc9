//! 连接服务路由模块

use axum::{
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use common::middleware::request_id_middleware;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::handlers;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "连接服务 API",
        version = "0.1.0",
        description = "外部数据库连接池管理与查询执行服务"
    ),
    paths(
        handlers::execute_query,
        handlers::test_connection,
        handlers::close_pool,
        handlers::list_pools,
        handlers::health_check,
    ),
    components(schemas(
        common::models::DbType,
        common::models::QueryRequest,
        common::models::QueryResult,
        common::models::ConnectionTestResult,
        common::models::TestStatus,
        common::models::PoolSnapshot,
        common::models::PoolStatus,
        handlers::HealthResponse,
    )),
    tags(
        (name = "connections", description = "查询执行与连接测试"),
        (name = "pools", description = "连接池管理（内部）"),
        (name = "health", description = "健康检查端点")
    )
)]
pub struct ApiDoc;

/// 创建连接服务路由
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/connections/{id}/query", post(handlers::execute_query))
        .route("/api/connections/{id}/test", post(handlers::test_connection))
        .route("/internal/pools", get(handlers::list_pools))
        .route("/internal/pools/{id}", delete(handlers::close_pool))
        .route("/api/health", get(handlers::health_check))
}

/// 组装完整应用：路由、OpenAPI 文档与中间件
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

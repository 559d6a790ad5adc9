//! Handler模块

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use common::errors::AppError;
use common::models::{ConnectionTestResult, PoolSnapshot, QueryRequest, QueryResult};
use common::response::ApiResponse;

use crate::state::AppState;
use crate::SERVICE_NAME;

/// 在指定连接上执行 SQL
#[utoipa::path(
    post,
    path = "/api/connections/{id}/query",
    tag = "connections",
    params(
        ("id" = String, Path, description = "连接 ID")
    ),
    request_body = QueryRequest,
    responses(
        (status = 200, description = "查询结果", body = ApiResponse<QueryResult>),
        (status = 404, description = "连接未找到"),
        (status = 409, description = "连接未启用"),
        (status = 502, description = "数据库驱动错误")
    )
)]
pub async fn execute_query(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<ApiResponse<QueryResult>>, AppError> {
    req.validate()?;
    let data = state.executor.execute(&id, &req.query, &req.parameters).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 测试数据库连接
///
/// 失败也返回 200，结果中 `success` 为 false。
#[utoipa::path(
    post,
    path = "/api/connections/{id}/test",
    tag = "connections",
    params(
        ("id" = String, Path, description = "连接 ID")
    ),
    responses(
        (status = 200, description = "连接测试结果", body = ApiResponse<ConnectionTestResult>)
    )
)]
pub async fn test_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<ApiResponse<ConnectionTestResult>> {
    let data = state.executor.test_connection(&id).await;
    Json(ApiResponse::ok_with_service(data, SERVICE_NAME))
}

/// 内部端点：连接配置变更或删除后关闭其连接池
#[utoipa::path(
    delete,
    path = "/internal/pools/{id}",
    tag = "pools",
    params(
        ("id" = String, Path, description = "连接 ID")
    ),
    responses(
        (status = 200, description = "连接池已关闭", body = ApiResponse<bool>)
    )
)]
pub async fn close_pool(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<ApiResponse<bool>> {
    state.executor.close_pool(&id).await;
    Json(ApiResponse::ok_with_service(true, SERVICE_NAME))
}

/// 内部端点：列出当前连接池
#[utoipa::path(
    get,
    path = "/internal/pools",
    tag = "pools",
    responses(
        (status = 200, description = "连接池快照", body = ApiResponse<Vec<PoolSnapshot>>)
    )
)]
pub async fn list_pools(State(state): State<AppState>) -> Json<ApiResponse<Vec<PoolSnapshot>>> {
    let data = state.executor.pool_snapshots().await;
    Json(ApiResponse::ok_with_service(data, SERVICE_NAME))
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        pools: state.executor.registry().pool_count().await,
    })
}

/// 健康检查响应
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 服务名称
    pub service: String,
    /// 服务版本
    pub version: String,
    /// 当前时间戳
    pub timestamp: DateTime<Utc>,
    /// 当前连接池数量
    pub pools: usize,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use common::config::{AppConfig, LogFormat};
    use common::models::{ConnectionConfig, DbType, SecretConnectionConfig};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::drivers::fake::FakeAdapter;
    use crate::drivers::AdapterTable;
    use crate::executor::QueryExecutor;
    use crate::registry::PoolRegistry;
    use crate::routes::create_router;
    use crate::state::AppState;
    use crate::store::MemoryConnectionStore;
    use crate::SERVICE_NAME;

    fn test_config() -> AppConfig {
        AppConfig {
            service_name: SERVICE_NAME.to_string(),
            host: "127.0.0.1".into(),
            port: 0,
            database_url: "sqlite::memory:".into(),
            reconnect_delay_secs: 5,
            log_format: LogFormat::Pretty,
        }
    }

    async fn app() -> (Router, FakeAdapter) {
        let store = Arc::new(MemoryConnectionStore::new());
        let config = ConnectionConfig::new("1", "sales", DbType::Postgres, "db", "sales", "reader");
        store.insert(SecretConnectionConfig::new(config, "pw")).await;

        let adapter = FakeAdapter::new(DbType::Postgres);
        let registry = PoolRegistry::new(
            store,
            AdapterTable::new().with(Arc::new(adapter.clone())),
            Duration::from_secs(5),
        );
        let state = AppState::new(test_config(), QueryExecutor::new(registry));
        (create_router(state), adapter)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_execute_query_endpoint() {
        let (app, adapter) = app().await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/connections/1/query",
            Some(json!({ "query": "SELECT $1", "parameters": ["x"] })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"]["row_count"], json!(1));
        assert_eq!(body["data"]["rows"][0]["params"], json!(1));
        assert_eq!(body["meta"]["service"], json!(SERVICE_NAME));
        assert_eq!(adapter.constructions(), 1);
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let (app, adapter) = app().await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/connections/1/query",
            Some(json!({ "query": "" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));
        assert_eq!(adapter.constructions(), 0);
    }

    #[tokio::test]
    async fn test_unknown_connection_returns_404() {
        let (app, _) = app().await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/connections/42/query",
            Some(json!({ "query": "SELECT 1" })),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], json!("CONNECTION_NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_driver_error_returns_502() {
        let (app, adapter) = app().await;
        adapter.set_query_error(Some("relation \"missing\" does not exist"));
        let (status, body) = send(
            &app,
            "POST",
            "/api/connections/1/query",
            Some(json!({ "query": "SELECT * FROM missing" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], json!("DRIVER_ERROR"));
    }

    #[tokio::test]
    async fn test_failed_connection_test_is_200() {
        let (app, adapter) = app().await;
        adapter.set_connect_error(Some("password authentication failed"));
        let (status, body) = send(&app, "POST", "/api/connections/1/test", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["success"], json!(false));
        assert_eq!(body["data"]["status"], json!("failed"));
        assert_eq!(body["data"]["name"], json!("sales"));
    }

    #[tokio::test]
    async fn test_pool_listing_and_close() {
        let (app, adapter) = app().await;
        send(&app, "POST", "/api/connections/1/test", None).await;

        let (status, body) = send(&app, "GET", "/internal/pools", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["key"], json!("postgres_1"));
        assert!(body["data"][0]["options"].get("password").is_none());

        let (status, _) = send(&app, "DELETE", "/internal/pools/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(adapter.closes(), 1);

        let (_, body) = send(&app, "GET", "/api/health", None).await;
        assert_eq!(body["pools"], json!(0));
        assert_eq!(body["status"], json!("healthy"));
    }

    #[tokio::test]
    async fn test_openapi_document_lists_routes() {
        let (app, _) = app().await;
        let (status, body) = send(&app, "GET", "/api-docs/openapi.json", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"].get("/api/connections/{id}/query").is_some());
        assert!(body["paths"].get("/internal/pools").is_some());
    }
}

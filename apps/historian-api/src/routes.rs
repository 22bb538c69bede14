//! 路由定义
//!
//! - 健康检查：/health
//! - 数据源控制：/api/sources/*
//! - 读数查询：/api/sources/{id}/readings
//! - 调试信息：/api/debug

use super::AppState;
use super::handlers::*;
use super::middleware::request_context;
use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/debug", get(debug_info))
        .route("/api/sources/start", post(start_source))
        .route("/api/sources/status", get(list_statuses))
        .route("/api/sources/:source_id", delete(remove_source))
        .route("/api/sources/:source_id/stop", post(stop_source))
        .route("/api/sources/:source_id/restart", post(restart_source))
        .route("/api/sources/:source_id/status", get(get_status))
        .route("/api/sources/:source_id/readings", get(list_readings))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // 注入 request_id/trace_id
        .layer(middleware::from_fn(request_context))
}

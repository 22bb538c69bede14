//! 健康检查与调试 handlers
//!
//! - GET /health
//! - GET /api/debug

use crate::AppState;
use api_contract::{ApiResponse, HealthDto};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

pub async fn health(State(state): State<AppState>) -> Response {
    let data = HealthDto {
        status: "ok".to_string(),
        ingest_enabled: state.ingest_enabled,
        initialized: state.manager.is_initialized(),
    };
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// 连接器数量、已注册接口类型、各数据源状态与采集计数。
pub async fn debug_info(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        Json(ApiResponse::success(state.manager.debug_info())),
    )
        .into_response()
}

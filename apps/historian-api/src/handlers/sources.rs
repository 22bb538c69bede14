//! 数据源控制 handlers
//!
//! - POST /api/sources/start
//! - POST /api/sources/{id}/stop
//! - POST /api/sources/{id}/restart
//! - DELETE /api/sources/{id}
//! - GET /api/sources/status
//! - GET /api/sources/{id}/status

use crate::AppState;
use crate::utils::response::{manager_error, not_found_error, status_to_dto};
use api_contract::{ApiResponse, RestartSourceDto, SourceActionDto, SourceStatusDto};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::SourceConfig;
use tracing::warn;

#[derive(serde::Deserialize)]
pub struct SourcePath {
    pub(crate) source_id: i64,
}

/// 按请求体中的配置启动数据源，成功后写入配置存储供重启使用。
pub async fn start_source(
    State(state): State<AppState>,
    Json(config): Json<SourceConfig>,
) -> Response {
    let status = match state.manager.start_source(config.clone()).await {
        Ok(status) => status,
        Err(err) => return manager_error(err),
    };
    if let Err(err) = state.manager.store().upsert_source(config).await {
        warn!(
            target: "historian.ingest",
            source_id = status.source_id,
            error = %err,
            "source_config_persist_failed"
        );
    }
    (StatusCode::OK, Json(ApiResponse::success(status_to_dto(status)))).into_response()
}

pub async fn stop_source(State(state): State<AppState>, Path(path): Path<SourcePath>) -> Response {
    match state.manager.stop_source(path.source_id).await {
        Ok(tracked) => action_response(path.source_id, tracked),
        Err(err) => manager_error(err),
    }
}

pub async fn restart_source(
    State(state): State<AppState>,
    Path(path): Path<SourcePath>,
) -> Response {
    match state.manager.restart_source(path.source_id).await {
        Ok(status) => {
            let data = RestartSourceDto {
                source_id: path.source_id,
                restarted: status.is_some(),
                status: status.map(status_to_dto),
            };
            (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
        }
        Err(err) => manager_error(err),
    }
}

pub async fn remove_source(
    State(state): State<AppState>,
    Path(path): Path<SourcePath>,
) -> Response {
    match state.manager.remove_source(path.source_id).await {
        Ok(tracked) => action_response(path.source_id, tracked),
        Err(err) => manager_error(err),
    }
}

pub async fn list_statuses(State(state): State<AppState>) -> Response {
    let data: Vec<SourceStatusDto> = state
        .manager
        .all_statuses()
        .into_iter()
        .map(status_to_dto)
        .collect();
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

pub async fn get_status(State(state): State<AppState>, Path(path): Path<SourcePath>) -> Response {
    match state.manager.status(path.source_id) {
        Some(status) => {
            (StatusCode::OK, Json(ApiResponse::success(status_to_dto(status)))).into_response()
        }
        None => not_found_error(format!("source {} is not running", path.source_id)),
    }
}

fn action_response(source_id: i64, tracked: bool) -> Response {
    let data = SourceActionDto { source_id, tracked };
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

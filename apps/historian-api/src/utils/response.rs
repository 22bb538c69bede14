//! HTTP 响应辅助函数和 DTO 转换
//!
//! - 错误响应：bad_request_error, invalid_config_error, not_found_error, storage_error, manager_error
//! - DTO 转换：status_to_dto, reading_to_dto

use api_contract::{ApiResponse, LocationDto, ReadingDto, SourceStatusDto};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::{ConnectorPhase, ConnectorStatus, Reading};
use historian_ingest::ManagerError;
use historian_storage::StorageError;
use tracing::warn;

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<()>::error(code, message.into()))).into_response()
}

/// 错误请求响应
pub fn bad_request_error(message: impl Into<String>) -> Response {
    error_response(StatusCode::BAD_REQUEST, "INVALID.REQUEST", message)
}

/// 数据源配置非法（缺字段、非法取值、不支持的接口类型）
pub fn invalid_config_error(message: impl Into<String>) -> Response {
    error_response(StatusCode::BAD_REQUEST, "SOURCE.INVALID_CONFIG", message)
}

/// 资源未找到错误响应
pub fn not_found_error(message: impl Into<String>) -> Response {
    error_response(StatusCode::NOT_FOUND, "SOURCE.NOT_FOUND", message)
}

/// 存储错误响应
pub fn storage_error(err: StorageError) -> Response {
    warn!(error = %err, "storage_error");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL.ERROR",
        err.to_string(),
    )
}

/// 生命周期管理错误映射
pub fn manager_error(err: ManagerError) -> Response {
    let message = err.to_string();
    match err {
        ManagerError::SourceInactive(_) => {
            error_response(StatusCode::BAD_REQUEST, "SOURCE.INACTIVE", message)
        }
        ManagerError::NotFound(_) => not_found_error(message),
        ManagerError::Storage(err) => storage_error(err),
        ManagerError::Connector(err) if err.is_config_error() => invalid_config_error(message),
        ManagerError::Connector(err) => {
            warn!(error = %err, "source_operation_failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "SOURCE.OPERATION_FAILED",
                message,
            )
        }
    }
}

fn phase_name(phase: ConnectorPhase) -> &'static str {
    match phase {
        ConnectorPhase::Stopped => "STOPPED",
        ConnectorPhase::Starting => "STARTING",
        ConnectorPhase::Running => "RUNNING",
        ConnectorPhase::ReconnectScheduled => "RECONNECT_SCHEDULED",
    }
}

/// ConnectorStatus 转 SourceStatusDto
pub fn status_to_dto(status: ConnectorStatus) -> SourceStatusDto {
    SourceStatusDto {
        source_id: status.source_id,
        interface_type: status.interface_type.to_string(),
        phase: phase_name(status.phase).to_string(),
        is_running: status.is_running,
        last_activity: status.last_activity,
        last_error: status.last_error,
        reconnect_pending: status.reconnect_pending,
        reconnect_attempts: status.reconnect_attempts,
        readings_produced: status.readings_produced,
    }
}

/// Reading 转 ReadingDto
pub fn reading_to_dto(reading: Reading) -> ReadingDto {
    ReadingDto {
        source_id: reading.source_id,
        tag_name: reading.tag_name,
        value: reading.value,
        timestamp: reading.timestamp,
        quality: reading.quality,
        metadata: reading.metadata,
        location: reading.location.map(|location| LocationDto {
            latitude: location.latitude,
            longitude: location.longitude,
            altitude: location.altitude,
        }),
    }
}

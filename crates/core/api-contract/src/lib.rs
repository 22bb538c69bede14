//! 稳定的 DTO 与 API 响应契约。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 连接器状态返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatusDto {
    pub source_id: i64,
    pub interface_type: String,
    pub phase: String,
    pub is_running: bool,
    pub last_activity: Option<i64>,
    pub last_error: Option<String>,
    pub reconnect_pending: bool,
    pub reconnect_attempts: u64,
    pub readings_produced: u64,
}

/// 停止/移除数据源的返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceActionDto {
    pub source_id: i64,
    /// 操作前是否在运行表中
    pub tracked: bool,
}

/// 重启数据源的返回结构；配置已停用时 `status` 为空。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartSourceDto {
    pub source_id: i64,
    pub restarted: bool,
    pub status: Option<SourceStatusDto>,
}

/// 读数查询参数。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingsQueryParams {
    #[serde(alias = "tag_name")]
    pub tag: Option<String>,
    /// 起始时间（epoch 毫秒，含）
    pub from: Option<i64>,
    /// 结束时间（epoch 毫秒，含）
    pub to: Option<i64>,
    pub limit: Option<i64>,
    /// `asc`（默认）或 `desc`
    pub order: Option<String>,
    /// 只返回每个 tag 的最新值
    #[serde(default)]
    pub latest: bool,
}

/// 定位信息返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationDto {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
}

/// 读数返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingDto {
    pub source_id: i64,
    pub tag_name: String,
    pub value: Value,
    pub timestamp: i64,
    pub quality: i32,
    pub metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationDto>,
}

/// 健康检查返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthDto {
    pub status: String,
    pub ingest_enabled: bool,
    pub initialized: bool,
}

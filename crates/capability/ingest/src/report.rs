use domain::{ConnectorStatus, InterfaceType};
use historian_telemetry::MetricsSnapshot;
use serde::Serialize;

/// 单个数据源的失败原因。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFailure {
    pub source_id: i64,
    pub error: String,
}

/// 启动时加载活动数据源的结果。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitReport {
    pub started: Vec<i64>,
    pub failed: Vec<SourceFailure>,
}

/// 关闭全部连接器的结果。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShutdownReport {
    pub stopped: Vec<i64>,
    pub failed: Vec<SourceFailure>,
}

/// 调试信息。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub initialized: bool,
    pub tracked: usize,
    pub running: usize,
    pub registered_kinds: Vec<InterfaceType>,
    pub sources: Vec<ConnectorStatus>,
    pub metrics: MetricsSnapshot,
}

use crate::source::InterfaceType;
use serde::{Deserialize, Serialize};

/// 连接器运行阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectorPhase {
    Stopped,
    Starting,
    Running,
    ReconnectScheduled,
}

/// 连接器状态快照（同步读取，无 I/O）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorStatus {
    pub source_id: i64,
    pub interface_type: InterfaceType,
    pub phase: ConnectorPhase,
    /// 传输层真实状态，而非期望状态。
    pub is_running: bool,
    pub last_activity: Option<i64>,
    pub last_error: Option<String>,
    pub reconnect_pending: bool,
    pub reconnect_attempts: u64,
    pub readings_produced: u64,
}

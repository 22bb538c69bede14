//! 数据历史库的核心领域模型：数据源配置、规整读数与连接器状态。

pub mod data;
pub mod source;
pub mod status;

pub use data::{Location, QUALITY_GOOD, Reading, now_epoch_ms};
pub use source::{InterfaceType, ProtocolType, SourceConfig};
pub use status::{ConnectorPhase, ConnectorStatus};

//! # 数据源生命周期管理
//!
//! [`SourceManager`] 持有全部正在运行的连接器，每个数据源对应：
//! - 一个由 [`historian_protocol::ConnectorRegistry`] 构造的连接器；
//! - 一个按生产顺序落库的 [`historian_pipeline::ReadingPipeline`]。
//!
//! 变更操作（启动、停止、重启、移除、关闭）串行执行；状态读取是同步快照，
//! 可与变更并发。

mod error;
mod manager;
mod report;

pub use error::ManagerError;
pub use manager::SourceManager;
pub use report::{DebugInfo, InitReport, ShutdownReport, SourceFailure};

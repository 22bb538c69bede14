use historian_protocol::ConnectorError;
use historian_storage::StorageError;

/// 生命周期管理错误。
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("source {0} not found")]
    NotFound(i64),
    #[error("source {0} is inactive")]
    SourceInactive(i64),
}

impl ManagerError {
    /// 请求方的配置问题（非法配置、不支持的接口、未激活）
    pub fn is_config_error(&self) -> bool {
        match self {
            Self::Connector(err) => err.is_config_error(),
            Self::SourceInactive(_) => true,
            Self::Storage(_) | Self::NotFound(_) => false,
        }
    }
}

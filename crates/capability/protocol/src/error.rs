//! 连接器错误类型定义

use domain::InterfaceType;

/// 连接器错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectorError {
    /// 必填字段缺失（一次列出全部缺失字段）
    #[error("missing required config fields: {}", .missing.join(", "))]
    ConfigValidation { missing: Vec<String> },

    /// 字段存在但取值非法
    #[error("invalid config field {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    /// 传输层错误（连接、读写、关闭）
    #[error("transport error: {0}")]
    Transport(String),

    /// 接口类型没有对应的连接器
    #[error("unsupported interface type: {0}")]
    Unsupported(InterfaceType),
}

impl ConnectorError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    /// 配置类错误（校验失败、非法取值、不支持的类型）
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigValidation { .. } | Self::InvalidConfig { .. } | Self::Unsupported(_)
        )
    }
}

impl From<std::io::Error> for ConnectorError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

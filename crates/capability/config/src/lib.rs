//! 应用运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    /// 未设置时使用内存存储
    pub database_url: Option<String>,
    /// 未设置时最新值写入内存
    pub redis_url: Option<String>,
    pub redis_latest_ttl_seconds: Option<u64>,
    /// 内存配置存储的 JSON 种子文件
    pub sources_file: Option<String>,
    /// 启动时是否加载并启动活跃数据源
    pub ingest_enabled: bool,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_addr =
            env::var("HISTORIAN_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let database_url = read_optional("HISTORIAN_DATABASE_URL");
        let redis_url = read_optional("HISTORIAN_REDIS_URL");
        let redis_latest_ttl_seconds =
            read_optional_u64("HISTORIAN_REDIS_LATEST_TTL_SECONDS")?.filter(|value| *value > 0);
        let sources_file = read_optional("HISTORIAN_SOURCES_FILE");
        let ingest_enabled = read_bool_with_default("HISTORIAN_INGEST", true);

        if database_url.is_some() && sources_file.is_some() {
            return Err(ConfigError::Invalid(
                "HISTORIAN_SOURCES_FILE".to_string(),
                "cannot be combined with HISTORIAN_DATABASE_URL".to_string(),
            ));
        }

        Ok(Self {
            http_addr,
            database_url,
            redis_url,
            redis_latest_ttl_seconds,
            sources_file,
            ingest_enabled,
        })
    }
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_optional_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(key.to_string(), value)),
        Err(_) => Ok(None),
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}

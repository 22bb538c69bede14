//! 连接器配置读取
//!
//! 字段按 `interfaceConfig` → `protocolConfig` → `customConfig` 顺序查找。

use crate::error::ConnectorError;
use domain::SourceConfig;
use historian_normalize::{DataFormat, TextFormat};
use serde_json::{Map, Value};
use std::time::Duration;

/// 校验必填字段，缺失时一次列出全部字段。
pub fn require_fields(config: &SourceConfig, fields: &[&str]) -> Result<(), ConnectorError> {
    let missing: Vec<String> = fields
        .iter()
        .filter(|field| is_missing(config.lookup(field)))
        .map(|field| field.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConnectorError::ConfigValidation { missing })
    }
}

fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

/// 已确认存在的字符串字段（数字也按字符串读取）。
pub fn string_field(config: &SourceConfig, field: &str) -> Result<String, ConnectorError> {
    match config.lookup(field) {
        Some(Value::String(text)) => Ok(text.trim().to_string()),
        Some(Value::Number(number)) => Ok(number.to_string()),
        Some(other) => Err(ConnectorError::invalid(
            field,
            format!("expected string, got {}", other),
        )),
        None => Err(ConnectorError::ConfigValidation {
            missing: vec![field.to_string()],
        }),
    }
}

pub fn optional_string(config: &SourceConfig, field: &str) -> Option<String> {
    config
        .lookup_str(field)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// 端口字段（兼容字符串形式）。
pub fn port_field(config: &SourceConfig, field: &str) -> Result<u16, ConnectorError> {
    let value = config
        .lookup_u64(field)
        .ok_or_else(|| ConnectorError::invalid(field, "expected a port number"))?;
    u16::try_from(value).map_err(|_| ConnectorError::invalid(field, "port out of range"))
}

pub fn u64_field(config: &SourceConfig, field: &str) -> Result<u64, ConnectorError> {
    config
        .lookup_u64(field)
        .ok_or_else(|| ConnectorError::invalid(field, "expected a non-negative integer"))
}

/// 可选整数字段；存在但非法时报错。
pub fn optional_u64(config: &SourceConfig, field: &str) -> Result<Option<u64>, ConnectorError> {
    match config.lookup(field) {
        None => Ok(None),
        Some(_) => u64_field(config, field).map(Some),
    }
}

/// 毫秒间隔字段，缺省时使用默认值，0 视为非法。
pub fn interval_field(
    config: &SourceConfig,
    field: &str,
    default_ms: u64,
) -> Result<Duration, ConnectorError> {
    match optional_u64(config, field)? {
        None => Ok(Duration::from_millis(default_ms)),
        Some(0) => Err(ConnectorError::invalid(field, "interval must be positive")),
        Some(ms) => Ok(Duration::from_millis(ms)),
    }
}

/// 文本类负载的规整参数：`dataFormat` / `tagName` / `tagPrefix` / `delimiter` / `headers`。
pub fn text_format(config: &SourceConfig, default_format: DataFormat) -> Result<TextFormat, ConnectorError> {
    let format = config
        .lookup_str("dataFormat")
        .map(DataFormat::parse)
        .unwrap_or(default_format);
    let delimiter = match config.lookup_str("delimiter") {
        None => ',',
        Some("\\t") => '\t',
        Some(text) => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => ch,
                _ => {
                    return Err(ConnectorError::invalid(
                        "delimiter",
                        "expected a single character",
                    ))
                }
            }
        }
    };
    Ok(TextFormat {
        format,
        base_tag: optional_string(config, "tagName").unwrap_or_else(|| "value".to_string()),
        tag_prefix: optional_string(config, "tagPrefix"),
        delimiter,
        headers: config.lookup_str_list("headers").filter(|items| !items.is_empty()),
    })
}

/// 来源元数据（写入每条读数的 metadata）。
pub fn provenance(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

//! # 报文规整能力模块
//!
//! 把各协议的原始负载转换为扁平的 [`domain::Reading`] 序列。
//! 所有函数都是纯函数：不做 I/O、不挂起，相同输入得到相同 tag 与值。
//!
//! - [`json`]：嵌套对象深度优先展平（`a.b.c`），数组作为叶子值
//! - [`text`]：CSV 行拆分、数值强制转换、纯文本行
//! - [`modbus`]：寄存器块 → `tag` / `tag_<index>`
//! - [`mqtt`]：topic + 负载 → `topic.a.b`
//! - [`nmea`]：NMEA 0183 语句类型过滤与 GGA 定位解析

pub mod json;
pub mod modbus;
pub mod mqtt;
pub mod nmea;
pub mod text;

pub use json::{diagnostic_reading, flatten_json, normalize_json_text, parse_json};
pub use modbus::{RegisterBlock, RegisterKind, RegisterValues, normalize_register_block};
pub use mqtt::normalize_mqtt_message;
pub use nmea::{normalize_nmea_line, parse_gga, sentence_type};
pub use text::{coerce_scalar, normalize_csv_line, normalize_text_line, split_csv_line};

use domain::Reading;
use serde_json::{Map, Value};

/// 规整错误（负载解析失败，由调用方转换为诊断读数）。
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("invalid json: {0}")]
    InvalidJson(String),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// 文本类负载的数据格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Json,
    Csv,
    Text,
}

impl DataFormat {
    /// 从配置字符串解析；未知值回退为 `Text`。
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "csv" => Self::Csv,
            _ => Self::Text,
        }
    }
}

/// 文本负载的规整参数（TCP/UDP/File/Serial 共用）。
#[derive(Debug, Clone)]
pub struct TextFormat {
    pub format: DataFormat,
    /// 非对象值与诊断读数使用的基础 tag。
    pub base_tag: String,
    /// JSON 展平前缀。
    pub tag_prefix: Option<String>,
    pub delimiter: char,
    pub headers: Option<Vec<String>>,
}

impl Default for TextFormat {
    fn default() -> Self {
        Self {
            format: DataFormat::Json,
            base_tag: "value".to_string(),
            tag_prefix: None,
            delimiter: ',',
            headers: None,
        }
    }
}

impl TextFormat {
    /// 按格式规整一行/一段文本。
    pub fn normalize(
        &self,
        source_id: i64,
        text: &str,
        line_index: u64,
        timestamp: i64,
        provenance: &Map<String, Value>,
    ) -> Vec<Reading> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        match self.format {
            DataFormat::Json => normalize_json_text(
                source_id,
                text,
                &self.base_tag,
                self.tag_prefix.as_deref(),
                timestamp,
                provenance,
            ),
            DataFormat::Csv => normalize_csv_line(
                source_id,
                text,
                line_index,
                self.delimiter,
                self.headers.as_deref(),
                timestamp,
                provenance,
            ),
            DataFormat::Text => {
                normalize_text_line(source_id, text, &self.base_tag, timestamp, provenance)
            }
        }
    }
}

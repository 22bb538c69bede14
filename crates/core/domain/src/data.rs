use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 质量码：GOOD（所有连接器统一使用）。
pub const QUALITY_GOOD: i32 = 192;

/// 地理位置（NMEA GGA 等来源）。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

/// 规整后的读数（带 tag 的时序值）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub source_id: i64,
    pub tag_name: String,
    pub value: Value,
    pub quality: i32,
    /// 毫秒时间戳。
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Reading {
    /// 构造 GOOD 质量的读数。
    pub fn good(
        source_id: i64,
        tag_name: impl Into<String>,
        value: Value,
        timestamp: i64,
    ) -> Self {
        Self {
            source_id,
            tag_name: tag_name.into(),
            value,
            quality: QUALITY_GOOD,
            timestamp,
            location: None,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// 合并一组来源元数据（已存在的键不覆盖）。
    pub fn with_provenance(mut self, provenance: &Map<String, Value>) -> Self {
        for (key, value) in provenance {
            self.metadata
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

/// 获取当前时间戳（毫秒）
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

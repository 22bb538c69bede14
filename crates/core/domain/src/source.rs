//! 数据源配置模型

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// 物理/传输接口类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterfaceType {
    Serial,
    Tcp,
    Udp,
    File,
    Api,
    Modbus,
    Mqtt,
    Usb,
}

impl InterfaceType {
    pub const ALL: [InterfaceType; 8] = [
        Self::Serial,
        Self::Tcp,
        Self::Udp,
        Self::File,
        Self::Api,
        Self::Modbus,
        Self::Mqtt,
        Self::Usb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Serial => "SERIAL",
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::File => "FILE",
            Self::Api => "API",
            Self::Modbus => "MODBUS",
            Self::Mqtt => "MQTT",
            Self::Usb => "USB",
        }
    }
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterfaceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|item| item.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown interface type: {}", s))
    }
}

/// 应用层协议类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolType {
    #[serde(rename = "MODBUS_RTU")]
    ModbusRtu,
    #[serde(rename = "MODBUS_TCP")]
    ModbusTcp,
    #[serde(rename = "OPC_UA")]
    OpcUa,
    #[serde(rename = "MQTT")]
    Mqtt,
    #[serde(rename = "NMEA_0183")]
    Nmea0183,
    #[serde(rename = "HART")]
    Hart,
    #[serde(rename = "ANALOG_4_20MA")]
    Analog4To20Ma,
    #[serde(rename = "ANALOG_0_5V")]
    Analog0To5V,
    #[serde(rename = "API_REST")]
    ApiRest,
    #[serde(rename = "CUSTOM")]
    Custom,
    #[serde(rename = "OSI_PI")]
    OsiPi,
}

impl ProtocolType {
    pub const ALL: [ProtocolType; 11] = [
        Self::ModbusRtu,
        Self::ModbusTcp,
        Self::OpcUa,
        Self::Mqtt,
        Self::Nmea0183,
        Self::Hart,
        Self::Analog4To20Ma,
        Self::Analog0To5V,
        Self::ApiRest,
        Self::Custom,
        Self::OsiPi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModbusRtu => "MODBUS_RTU",
            Self::ModbusTcp => "MODBUS_TCP",
            Self::OpcUa => "OPC_UA",
            Self::Mqtt => "MQTT",
            Self::Nmea0183 => "NMEA_0183",
            Self::Hart => "HART",
            Self::Analog4To20Ma => "ANALOG_4_20MA",
            Self::Analog0To5V => "ANALOG_0_5V",
            Self::ApiRest => "API_REST",
            Self::Custom => "CUSTOM",
            Self::OsiPi => "OSI_PI",
        }
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|item| item.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown protocol type: {}", s))
    }
}

/// 数据源配置（持久化行的内存表示）。
///
/// 三个自由格式配置表由具体连接器解释；查找字段时按
/// `interface_config` → `protocol_config` → `custom_config` 顺序命中。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub id: i64,
    pub name: String,
    pub interface_type: InterfaceType,
    pub protocol_type: ProtocolType,
    #[serde(default)]
    pub interface_config: Map<String, Value>,
    #[serde(default)]
    pub protocol_config: Map<String, Value>,
    #[serde(default)]
    pub custom_config: Map<String, Value>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub user_id: Option<i64>,
}

fn default_active() -> bool {
    true
}

impl SourceConfig {
    /// 按优先级查找配置字段（null 视为缺失）。
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        [
            &self.interface_config,
            &self.protocol_config,
            &self.custom_config,
        ]
        .into_iter()
        .filter_map(|map| map.get(key))
        .find(|value| !value.is_null())
    }

    pub fn lookup_str(&self, key: &str) -> Option<&str> {
        self.lookup(key).and_then(Value::as_str)
    }

    /// 数值字段，兼容字符串形式的数字（如 `"502"`）。
    pub fn lookup_u64(&self, key: &str) -> Option<u64> {
        match self.lookup(key)? {
            Value::Number(number) => number.as_u64(),
            Value::String(text) => text.trim().parse::<u64>().ok(),
            _ => None,
        }
    }

    pub fn lookup_bool(&self, key: &str) -> Option<bool> {
        match self.lookup(key)? {
            Value::Bool(flag) => Some(*flag),
            Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => Some(true),
                "0" | "false" | "off" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// 字符串列表字段，兼容逗号分隔字符串。
    pub fn lookup_str_list(&self, key: &str) -> Option<Vec<String>> {
        match self.lookup(key)? {
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|item| item.trim().to_string())
                    .filter(|item| !item.is_empty())
                    .collect(),
            ),
            Value::String(text) => Some(
                text.split(',')
                    .map(|item| item.trim().to_string())
                    .filter(|item| !item.is_empty())
                    .collect(),
            ),
            _ => None,
        }
    }
}

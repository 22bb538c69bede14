//! Modbus 寄存器块规整

use domain::Reading;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 寄存器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterKind {
    /// 保持寄存器 (0x03)
    #[serde(alias = "holding_register", alias = "holding_registers")]
    Holding,
    /// 输入寄存器 (0x04)
    #[serde(alias = "input_register", alias = "input_registers")]
    Input,
    /// 线圈 (0x01)
    #[serde(alias = "coils")]
    Coil,
    /// 离散输入 (0x02)
    #[serde(alias = "discrete_input", alias = "discrete_inputs")]
    Discrete,
}

impl Default for RegisterKind {
    fn default() -> Self {
        Self::Holding
    }
}

impl RegisterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Holding => "holding",
            Self::Input => "input",
            Self::Coil => "coil",
            Self::Discrete => "discrete",
        }
    }
}

/// 寄存器块配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBlock {
    /// 起始地址
    pub address: u16,
    /// 寄存器类型
    #[serde(rename = "type", default)]
    pub kind: RegisterKind,
    /// 寄存器数量
    #[serde(default = "default_length")]
    pub length: u16,
    /// tag 名称
    pub tag_name: String,
}

fn default_length() -> u16 {
    1
}

/// 一次批量读取的结果。
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterValues {
    /// 保持/输入寄存器
    Words(Vec<u16>),
    /// 线圈/离散输入
    Bits(Vec<bool>),
}

impl RegisterValues {
    pub fn len(&self) -> usize {
        match self {
            Self::Words(values) => values.len(),
            Self::Bits(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn value_at(&self, index: usize) -> Option<Value> {
        match self {
            Self::Words(values) => values.get(index).map(|v| Value::from(*v)),
            Self::Bits(values) => values.get(index).map(|v| Value::Bool(*v)),
        }
    }
}

/// 寄存器块 → 读数。
///
/// 长度为 1 时产生一个名为 `tag_name` 的读数；长度大于 1 时每个元素产生
/// `tag_name_<index>`，元数据 `registerAddress = address + index`。
pub fn normalize_register_block(
    source_id: i64,
    block: &RegisterBlock,
    values: &RegisterValues,
    timestamp: i64,
    provenance: &Map<String, Value>,
) -> Vec<Reading> {
    let count = values.len().min(block.length as usize);
    (0..count)
        .filter_map(|index| {
            let value = values.value_at(index)?;
            let tag = if block.length <= 1 {
                block.tag_name.clone()
            } else {
                format!("{}_{}", block.tag_name, index)
            };
            let address = u32::from(block.address) + index as u32;
            Some(
                Reading::good(source_id, tag, value, timestamp)
                    .with_metadata("registerAddress", address)
                    .with_metadata("registerType", block.kind.as_str())
                    .with_provenance(provenance),
            )
        })
        .collect()
}

//! 串口连接器（含 NMEA 0183）
//!
//! 按行读取；协议为 NMEA_0183 时解析语句类型并按 `sentenceTypes` 过滤，
//! 其余行按 JSON 对象展平或作为文本值。

use crate::config::{
    interval_field, optional_string, optional_u64, provenance, require_fields, string_field,
    u64_field,
};
use crate::connector::{PayloadTx, Protocol};
use crate::error::ConnectorError;
use crate::{read_text_line, TextLine};
use async_trait::async_trait;
use domain::{InterfaceType, ProtocolType, Reading, SourceConfig};
use historian_normalize::{flatten_json, normalize_nmea_line, normalize_text_line, parse_json};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::io::BufReader;
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};

const DEFAULT_RECONNECT_MS: u64 = 5_000;

/// 串口协议
#[derive(Debug, Clone)]
pub struct SerialProtocol {
    source_id: i64,
    port: String,
    baud_rate: u32,
    data_bits: DataBits,
    parity: Parity,
    stop_bits: StopBits,
    nmea: bool,
    sentence_types: Option<Vec<String>>,
    base_tag: String,
    reconnect_interval: Duration,
    provenance: Map<String, Value>,
}

fn parse_data_bits(value: Option<u64>) -> Result<DataBits, ConnectorError> {
    match value {
        None | Some(8) => Ok(DataBits::Eight),
        Some(7) => Ok(DataBits::Seven),
        Some(6) => Ok(DataBits::Six),
        Some(5) => Ok(DataBits::Five),
        Some(other) => Err(ConnectorError::invalid(
            "dataBits",
            format!("unsupported value {}", other),
        )),
    }
}

fn parse_stop_bits(value: Option<u64>) -> Result<StopBits, ConnectorError> {
    match value {
        None | Some(1) => Ok(StopBits::One),
        Some(2) => Ok(StopBits::Two),
        Some(other) => Err(ConnectorError::invalid(
            "stopBits",
            format!("unsupported value {}", other),
        )),
    }
}

fn parse_parity(value: Option<String>) -> Result<Parity, ConnectorError> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("none") => Ok(Parity::None),
        Some("even") => Ok(Parity::Even),
        Some("odd") => Ok(Parity::Odd),
        Some(other) => Err(ConnectorError::invalid(
            "parity",
            format!("unsupported value {}", other),
        )),
    }
}

impl SerialProtocol {
    fn normalize_plain(&self, line: &str, received_at: i64) -> Vec<Reading> {
        match parse_json(line) {
            Ok(value @ Value::Object(_)) => flatten_json(&value, None)
                .into_iter()
                .map(|(tag, value)| {
                    Reading::good(self.source_id, tag, value, received_at)
                        .with_provenance(&self.provenance)
                })
                .collect(),
            _ => normalize_text_line(
                self.source_id,
                line,
                &self.base_tag,
                received_at,
                &self.provenance,
            ),
        }
    }
}

#[async_trait]
impl Protocol for SerialProtocol {
    type Session = SerialStream;
    type Payload = TextLine;

    const KIND: InterfaceType = InterfaceType::Serial;

    fn initialize(config: &SourceConfig) -> Result<Self, ConnectorError> {
        require_fields(config, &["port", "baudRate"])?;
        let port = string_field(config, "port")?;
        let baud_rate = u32::try_from(u64_field(config, "baudRate")?)
            .map_err(|_| ConnectorError::invalid("baudRate", "out of range"))?;
        if baud_rate == 0 {
            return Err(ConnectorError::invalid("baudRate", "must be positive"));
        }
        Ok(Self {
            source_id: config.id,
            provenance: provenance(&[("port", json!(port)), ("baudRate", json!(baud_rate))]),
            port,
            baud_rate,
            data_bits: parse_data_bits(optional_u64(config, "dataBits")?)?,
            parity: parse_parity(optional_string(config, "parity"))?,
            stop_bits: parse_stop_bits(optional_u64(config, "stopBits")?)?,
            nmea: config.protocol_type == ProtocolType::Nmea0183,
            sentence_types: config
                .lookup_str_list("sentenceTypes")
                .filter(|items| !items.is_empty()),
            base_tag: optional_string(config, "tagName").unwrap_or_else(|| "value".to_string()),
            reconnect_interval: interval_field(config, "reconnectInterval", DEFAULT_RECONNECT_MS)?,
        })
    }

    fn source_id(&self) -> i64 {
        self.source_id
    }

    fn reconnect_interval(&self) -> Duration {
        self.reconnect_interval
    }

    async fn connect(&self) -> Result<SerialStream, ConnectorError> {
        tokio_serial::new(self.port.as_str(), self.baud_rate)
            .data_bits(self.data_bits)
            .parity(self.parity)
            .stop_bits(self.stop_bits)
            .open_native_async()
            .map_err(|err| ConnectorError::Transport(format!("open {}: {}", self.port, err)))
    }

    async fn acquire(
        &self,
        stream: SerialStream,
        tx: PayloadTx<TextLine>,
    ) -> Result<(), ConnectorError> {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        let mut index = 0u64;
        while let Some(line) = read_text_line(&mut reader, &mut buf).await? {
            if line.trim().is_empty() {
                continue;
            }
            tx.send(TextLine { index, text: line });
            index += 1;
        }
        Ok(())
    }

    fn process_data(&self, line: TextLine, received_at: i64) -> Vec<Reading> {
        let text = line.text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        if self.nmea {
            match normalize_nmea_line(
                self.source_id,
                text,
                self.sentence_types.as_deref(),
                received_at,
                &self.provenance,
            ) {
                None => return Vec::new(),
                Some(readings) if !readings.is_empty() => return readings,
                Some(_) => {}
            }
        }
        self.normalize_plain(text, received_at)
    }
}

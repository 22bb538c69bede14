//! TCP 客户端连接器
//!
//! 主动连接设备，按行读取数据；配置 `requestCommand` 时按 `pollInterval`
//! 周期发送请求命令。
//!
//! ```json
//! { "host": "192.168.1.100", "port": 9000, "dataFormat": "json", "tagPrefix": "line1" }
//! ```

use crate::config::{
    interval_field, optional_string, port_field, provenance, require_fields, text_format,
};
use crate::connector::{PayloadTx, Protocol};
use crate::error::ConnectorError;
use crate::{read_text_line, TextLine};
use async_trait::async_trait;
use domain::{InterfaceType, Reading, SourceConfig};
use historian_normalize::{DataFormat, TextFormat};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

const DEFAULT_RECONNECT_MS: u64 = 5_000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_REQUEST_INTERVAL_MS: u64 = 1_000;

/// TCP 客户端协议
#[derive(Debug, Clone)]
pub struct TcpProtocol {
    source_id: i64,
    host: String,
    port: u16,
    connect_timeout: Duration,
    reconnect_interval: Duration,
    request_command: Option<String>,
    request_interval: Duration,
    format: TextFormat,
    provenance: Map<String, Value>,
}

impl TcpProtocol {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[async_trait]
impl Protocol for TcpProtocol {
    type Session = TcpStream;
    type Payload = TextLine;

    const KIND: InterfaceType = InterfaceType::Tcp;

    fn initialize(config: &SourceConfig) -> Result<Self, ConnectorError> {
        require_fields(config, &["port"])?;
        let host = optional_string(config, "host").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = port_field(config, "port")?;
        Ok(Self {
            source_id: config.id,
            provenance: provenance(&[("host", json!(host)), ("port", json!(port))]),
            host,
            port,
            connect_timeout: interval_field(config, "connectTimeout", DEFAULT_CONNECT_TIMEOUT_MS)?,
            reconnect_interval: interval_field(config, "reconnectInterval", DEFAULT_RECONNECT_MS)?,
            request_command: optional_string(config, "requestCommand"),
            request_interval: interval_field(config, "pollInterval", DEFAULT_REQUEST_INTERVAL_MS)?,
            format: text_format(config, DataFormat::Json)?,
        })
    }

    fn source_id(&self) -> i64 {
        self.source_id
    }

    fn reconnect_interval(&self) -> Duration {
        self.reconnect_interval
    }

    async fn connect(&self) -> Result<TcpStream, ConnectorError> {
        let address = self.address();
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(err)) => Err(ConnectorError::Transport(format!(
                "connect {}: {}",
                address, err
            ))),
            Err(_) => Err(ConnectorError::Transport(format!(
                "connect {}: timed out",
                address
            ))),
        }
    }

    async fn acquire(
        &self,
        stream: TcpStream,
        tx: PayloadTx<TextLine>,
    ) -> Result<(), ConnectorError> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut index = 0u64;
        let mut request_tick = tokio::time::interval(self.request_interval);

        loop {
            tokio::select! {
                line = read_text_line(&mut reader, &mut buf) => {
                    let Some(line) = line? else {
                        return Ok(());
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    tx.send(TextLine { index, text: line });
                    index += 1;
                }
                _ = request_tick.tick(), if self.request_command.is_some() => {
                    if let Some(command) = &self.request_command {
                        let framed = if command.ends_with('\n') {
                            command.clone()
                        } else {
                            format!("{}\n", command)
                        };
                        writer.write_all(framed.as_bytes()).await?;
                        writer.flush().await?;
                        debug!(target: "historian.protocol", source_id = self.source_id, command = %command, "request_sent");
                    }
                }
            }
        }
    }

    fn process_data(&self, line: TextLine, received_at: i64) -> Vec<Reading> {
        self.format.normalize(
            self.source_id,
            line.text.trim(),
            line.index,
            received_at,
            &self.provenance,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(interface_config: Value) -> SourceConfig {
        serde_json::from_value(json!({
            "id": 11,
            "name": "tcp",
            "interfaceType": "TCP",
            "protocolType": "CUSTOM",
            "interfaceConfig": interface_config,
        }))
        .unwrap()
    }

    #[test]
    fn port_is_required() {
        let err = TcpProtocol::initialize(&config(json!({"host": "10.0.0.1"}))).unwrap_err();
        assert_eq!(
            err,
            ConnectorError::ConfigValidation {
                missing: vec!["port".to_string()]
            }
        );
    }

    #[test]
    fn defaults_host_and_intervals() {
        let protocol = TcpProtocol::initialize(&config(json!({"port": 9000}))).unwrap();
        assert_eq!(protocol.address(), "127.0.0.1:9000");
        assert_eq!(protocol.reconnect_interval(), Duration::from_secs(5));
    }

    #[test]
    fn json_line_is_flattened_with_provenance() {
        let protocol = TcpProtocol::initialize(&config(json!({"port": 9000}))).unwrap();
        let readings = protocol.process_data(
            TextLine {
                index: 0,
                text: r#"{"pump":{"rpm":1450}}"#.to_string(),
            },
            10,
        );
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].tag_name, "pump.rpm");
        assert_eq!(readings[0].metadata["port"], json!(9000));
    }

    #[test]
    fn malformed_json_becomes_diagnostic() {
        let protocol = TcpProtocol::initialize(&config(json!({"port": 9000}))).unwrap();
        let readings = protocol.process_data(
            TextLine {
                index: 0,
                text: "{broken".to_string(),
            },
            10,
        );
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].tag_name, "value_raw");
        assert!(readings[0].metadata.contains_key("parseError"));
    }
}

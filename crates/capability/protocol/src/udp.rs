//! UDP 监听连接器
//!
//! 绑定本地地址接收数据报；JSON 格式下整个数据报为一个文档，
//! CSV/文本格式下按行拆分。

use crate::config::{
    interval_field, optional_string, port_field, provenance, require_fields, text_format,
};
use crate::connector::{PayloadTx, Protocol};
use crate::error::ConnectorError;
use async_trait::async_trait;
use domain::{InterfaceType, Reading, SourceConfig};
use historian_normalize::{DataFormat, TextFormat};
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

const DEFAULT_RECONNECT_MS: u64 = 5_000;
const MAX_DATAGRAM: usize = 65_535;

/// 收到的数据报
#[derive(Debug, Clone)]
pub struct Datagram {
    pub index: u64,
    pub peer: SocketAddr,
    pub text: String,
}

/// UDP 协议
#[derive(Debug, Clone)]
pub struct UdpProtocol {
    source_id: i64,
    host: String,
    port: u16,
    reconnect_interval: Duration,
    format: TextFormat,
    provenance: Map<String, Value>,
}

impl UdpProtocol {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[async_trait]
impl Protocol for UdpProtocol {
    type Session = UdpSocket;
    type Payload = Datagram;

    const KIND: InterfaceType = InterfaceType::Udp;

    fn initialize(config: &SourceConfig) -> Result<Self, ConnectorError> {
        require_fields(config, &["port"])?;
        let host = optional_string(config, "host").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = port_field(config, "port")?;
        Ok(Self {
            source_id: config.id,
            provenance: provenance(&[("host", json!(host)), ("port", json!(port))]),
            host,
            port,
            reconnect_interval: interval_field(config, "reconnectInterval", DEFAULT_RECONNECT_MS)?,
            format: text_format(config, DataFormat::Json)?,
        })
    }

    fn source_id(&self) -> i64 {
        self.source_id
    }

    fn reconnect_interval(&self) -> Duration {
        self.reconnect_interval
    }

    async fn connect(&self) -> Result<UdpSocket, ConnectorError> {
        let address = self.bind_address();
        UdpSocket::bind(&address)
            .await
            .map_err(|err| ConnectorError::Transport(format!("bind {}: {}", address, err)))
    }

    async fn acquire(
        &self,
        socket: UdpSocket,
        tx: PayloadTx<Datagram>,
    ) -> Result<(), ConnectorError> {
        let mut buffer = vec![0u8; MAX_DATAGRAM];
        let mut index = 0u64;
        loop {
            let (size, peer) = socket.recv_from(&mut buffer).await?;
            let text = String::from_utf8_lossy(&buffer[..size]).into_owned();
            if text.trim().is_empty() {
                continue;
            }
            tx.send(Datagram { index, peer, text });
            index += 1;
        }
    }

    fn process_data(&self, datagram: Datagram, received_at: i64) -> Vec<Reading> {
        let mut provenance = self.provenance.clone();
        provenance.insert("remoteAddress".to_string(), json!(datagram.peer.to_string()));
        match self.format.format {
            DataFormat::Json => self.format.normalize(
                self.source_id,
                datagram.text.trim(),
                datagram.index,
                received_at,
                &provenance,
            ),
            DataFormat::Csv | DataFormat::Text => datagram
                .text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .flat_map(|line| {
                    self.format.normalize(
                        self.source_id,
                        line,
                        datagram.index,
                        received_at,
                        &provenance,
                    )
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(interface_config: Value) -> SourceConfig {
        serde_json::from_value(json!({
            "id": 12,
            "name": "udp",
            "interfaceType": "UDP",
            "protocolType": "CUSTOM",
            "interfaceConfig": interface_config,
        }))
        .unwrap()
    }

    #[test]
    fn port_is_required_host_optional() {
        assert!(UdpProtocol::initialize(&config(json!({}))).is_err());
        let protocol = UdpProtocol::initialize(&config(json!({"port": 5005}))).unwrap();
        assert_eq!(protocol.bind_address(), "0.0.0.0:5005");
    }

    #[test]
    fn csv_datagram_is_split_into_lines() {
        let protocol = UdpProtocol::initialize(&config(json!({
            "port": 5005,
            "dataFormat": "csv",
            "headers": ["a", "b"]
        })))
        .unwrap();
        let readings = protocol.process_data(
            Datagram {
                index: 3,
                peer: "127.0.0.1:4000".parse().unwrap(),
                text: "1,2\n3,4\n".to_string(),
            },
            0,
        );
        let tags: Vec<&str> = readings.iter().map(|r| r.tag_name.as_str()).collect();
        assert_eq!(tags, vec!["a", "b", "a", "b"]);
        assert_eq!(readings[2].value, json!(3));
        assert_eq!(readings[0].metadata["remoteAddress"], json!("127.0.0.1:4000"));
    }
}

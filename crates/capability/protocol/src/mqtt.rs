//! MQTT 订阅连接器
//!
//! 连接 broker，收到 ConnAck 后视为启动成功；订阅 `topics`，每条 Publish
//! 按 topic 前缀展平为读数。
//!
//! ```json
//! { "brokerUrl": "mqtt://broker:1883", "topics": ["sensors/#"], "qos": 1 }
//! ```

use crate::config::{
    interval_field, optional_string, optional_u64, provenance, require_fields, string_field,
};
use crate::connector::{PayloadTx, Protocol};
use crate::error::ConnectorError;
use async_trait::async_trait;
use domain::{InterfaceType, Reading, SourceConfig};
use historian_normalize::normalize_mqtt_message;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS, Transport,
};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_RECONNECT_MS: u64 = 5_000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// 一条 MQTT 消息
#[derive(Debug, Clone, PartialEq)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// broker 地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// 解析 `mqtt://`、`mqtts://`、`tcp://`、`ssl://`、`tls://` 形式的 broker 地址，
/// 无端口时按是否 TLS 使用 1883/8883。
pub fn parse_broker_url(url: &str) -> Result<BrokerAddress, ConnectorError> {
    let (scheme, rest) = match url.find("://") {
        Some(pos) => (&url[..pos], &url[pos + 3..]),
        None => ("mqtt", url),
    };
    let tls = match scheme.to_ascii_lowercase().as_str() {
        "mqtts" | "ssl" | "tls" => true,
        "mqtt" | "tcp" => false,
        other => {
            return Err(ConnectorError::invalid(
                "brokerUrl",
                format!("unsupported scheme {}", other),
            ))
        }
    };
    let rest = rest.trim_end_matches('/');
    let (host, port) = match rest.rfind(':') {
        Some(pos) => {
            let port = rest[pos + 1..]
                .parse::<u16>()
                .map_err(|_| ConnectorError::invalid("brokerUrl", "invalid port"))?;
            (&rest[..pos], port)
        }
        None => (rest, if tls { 8883 } else { 1883 }),
    };
    if host.is_empty() {
        return Err(ConnectorError::invalid("brokerUrl", "missing host"));
    }
    Ok(BrokerAddress {
        host: host.to_string(),
        port,
        tls,
    })
}

fn parse_qos(config: &SourceConfig) -> Result<QoS, ConnectorError> {
    match optional_u64(config, "qos")? {
        None | Some(0) => Ok(QoS::AtMostOnce),
        Some(1) => Ok(QoS::AtLeastOnce),
        Some(2) => Ok(QoS::ExactlyOnce),
        Some(_) => Err(ConnectorError::invalid("qos", "expected 0, 1 or 2")),
    }
}

/// MQTT 协议
#[derive(Debug, Clone)]
pub struct MqttProtocol {
    source_id: i64,
    broker: BrokerAddress,
    topics: Vec<String>,
    client_id: String,
    credentials: Option<(String, String)>,
    qos: QoS,
    reconnect_interval: Duration,
    connect_timeout: Duration,
    provenance: Map<String, Value>,
}

impl MqttProtocol {
    pub fn broker(&self) -> &BrokerAddress {
        &self.broker
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.client_id.clone(),
            self.broker.host.clone(),
            self.broker.port,
        );
        options.set_keep_alive(KEEP_ALIVE);
        if let Some((username, password)) = &self.credentials {
            options.set_credentials(username, password);
        }
        if self.broker.tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        options
    }

    async fn await_connack(&self, eventloop: &mut EventLoop) -> Result<(), ConnectorError> {
        loop {
            match eventloop.poll().await.map_err(ConnectorError::transport)? {
                Event::Incoming(Packet::ConnAck(ack)) => {
                    if ack.code == ConnectReturnCode::Success {
                        return Ok(());
                    }
                    return Err(ConnectorError::Transport(format!(
                        "broker refused connection: {:?}",
                        ack.code
                    )));
                }
                _ => continue,
            }
        }
    }
}

#[async_trait]
impl Protocol for MqttProtocol {
    type Session = (AsyncClient, EventLoop);
    type Payload = MqttMessage;

    const KIND: InterfaceType = InterfaceType::Mqtt;

    fn initialize(config: &SourceConfig) -> Result<Self, ConnectorError> {
        require_fields(config, &["brokerUrl", "topics"])?;
        let broker_url = string_field(config, "brokerUrl")?;
        let broker = parse_broker_url(&broker_url)?;
        let topics = config.lookup_str_list("topics").unwrap_or_default();
        if topics.is_empty() {
            return Err(ConnectorError::invalid("topics", "expected at least one topic"));
        }
        let client_id = optional_string(config, "clientId").unwrap_or_else(|| {
            format!("historian-{}-{}", config.id, uuid::Uuid::new_v4().simple())
        });
        let credentials = match (
            optional_string(config, "username"),
            optional_string(config, "password"),
        ) {
            (Some(username), password) => Some((username, password.unwrap_or_default())),
            (None, _) => None,
        };
        let connect_timeout = match optional_u64(config, "connectTimeout")? {
            Some(ms) if ms > 0 => Duration::from_millis(ms),
            _ => Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        };
        Ok(Self {
            source_id: config.id,
            provenance: provenance(&[("brokerUrl", json!(broker_url))]),
            broker,
            topics,
            client_id,
            credentials,
            qos: parse_qos(config)?,
            reconnect_interval: interval_field(config, "reconnectInterval", DEFAULT_RECONNECT_MS)?,
            connect_timeout,
        })
    }

    fn source_id(&self) -> i64 {
        self.source_id
    }

    fn reconnect_interval(&self) -> Duration {
        self.reconnect_interval
    }

    async fn connect(&self) -> Result<(AsyncClient, EventLoop), ConnectorError> {
        // 订阅请求在 eventloop 轮询前排队，容量需容纳全部 topic
        let capacity = self.topics.len().max(10);
        let (client, mut eventloop) = AsyncClient::new(self.options(), capacity);
        for topic in &self.topics {
            client
                .subscribe(topic.as_str(), self.qos)
                .await
                .map_err(ConnectorError::transport)?;
        }
        tokio::time::timeout(self.connect_timeout, self.await_connack(&mut eventloop))
            .await
            .map_err(|_| {
                ConnectorError::Transport(format!(
                    "no ConnAck from {}:{}",
                    self.broker.host, self.broker.port
                ))
            })??;
        info!(
            target: "historian.protocol",
            source_id = self.source_id,
            host = %self.broker.host,
            port = self.broker.port,
            topics = ?self.topics,
            "mqtt_connected"
        );
        Ok((client, eventloop))
    }

    async fn acquire(
        &self,
        session: (AsyncClient, EventLoop),
        tx: PayloadTx<MqttMessage>,
    ) -> Result<(), ConnectorError> {
        // 采集结束前保持 client 存活，否则请求通道关闭
        let (_client, mut eventloop) = session;
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!(
                        target: "historian.protocol",
                        source_id = self.source_id,
                        topic = %publish.topic,
                        bytes = publish.payload.len(),
                        "mqtt_message"
                    );
                    tx.send(MqttMessage {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                    });
                }
                Ok(Event::Incoming(Packet::Disconnect)) => return Ok(()),
                Ok(_) => {}
                Err(err) => return Err(ConnectorError::transport(err)),
            }
        }
    }

    fn process_data(&self, message: MqttMessage, received_at: i64) -> Vec<Reading> {
        normalize_mqtt_message(
            self.source_id,
            &message.topic,
            &message.payload,
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
            "id": 4,
            "name": "broker",
            "interfaceType": "MQTT",
            "protocolType": "MQTT",
            "interfaceConfig": interface_config,
        }))
        .unwrap()
    }

    #[test]
    fn broker_url_schemes_and_default_ports() {
        assert_eq!(
            parse_broker_url("mqtt://broker.local").unwrap(),
            BrokerAddress {
                host: "broker.local".to_string(),
                port: 1883,
                tls: false
            }
        );
        let secure = parse_broker_url("mqtts://broker.local").unwrap();
        assert_eq!((secure.port, secure.tls), (8883, true));
        assert_eq!(parse_broker_url("tcp://10.0.0.1:1884").unwrap().port, 1884);
        assert_eq!(parse_broker_url("10.0.0.1").unwrap().host, "10.0.0.1");
        assert!(parse_broker_url("http://broker").is_err());
        assert!(parse_broker_url("mqtt://broker:abc").is_err());
    }

    #[test]
    fn broker_and_topics_are_required() {
        let err = MqttProtocol::initialize(&config(json!({"topics": []}))).unwrap_err();
        assert_eq!(
            err,
            ConnectorError::ConfigValidation {
                missing: vec!["brokerUrl".to_string(), "topics".to_string()]
            }
        );
        let protocol = MqttProtocol::initialize(&config(json!({
            "brokerUrl": "mqtt://broker:1883",
            "topics": "sensors/#, plant/+"
        })))
        .unwrap();
        assert_eq!(protocol.topics(), ["sensors/#", "plant/+"]);
        assert_eq!(protocol.reconnect_interval(), Duration::from_secs(5));
    }

    #[test]
    fn invalid_qos_is_rejected() {
        let err = MqttProtocol::initialize(&config(json!({
            "brokerUrl": "mqtt://broker",
            "topics": ["a"],
            "qos": 3
        })))
        .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn publish_is_flattened_under_topic() {
        let protocol = MqttProtocol::initialize(&config(json!({
            "brokerUrl": "mqtt://broker",
            "topics": ["sensors/#"]
        })))
        .unwrap();
        let readings = protocol.process_data(
            MqttMessage {
                topic: "sensors/room1".to_string(),
                payload: br#"{"temperature":21.5,"humidity":40}"#.to_vec(),
            },
            10,
        );
        let pairs: Vec<(&str, &Value)> = readings
            .iter()
            .map(|r| (r.tag_name.as_str(), &r.value))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("sensors/room1.temperature", &json!(21.5)),
                ("sensors/room1.humidity", &json!(40)),
            ]
        );
        assert_eq!(readings[0].metadata["brokerUrl"], json!("mqtt://broker"));
    }
}

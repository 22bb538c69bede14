//! REST API 轮询连接器
//!
//! 每个 `pollInterval`（默认 60s）请求一次 `url`，响应体按 JSON 展平。
//! 单次请求失败只记录到 `lastError`，不中断轮询。

use crate::config::{
    interval_field, optional_string, optional_u64, provenance, require_fields, string_field,
};
use crate::connector::{PayloadTx, Protocol};
use crate::error::ConnectorError;
use async_trait::async_trait;
use domain::{InterfaceType, Reading, SourceConfig};
use historian_normalize::{flatten_json, normalize_json_text, parse_json};
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

const DEFAULT_POLL_MS: u64 = 60_000;
const DEFAULT_RECONNECT_MS: u64 = 60_000;
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// 一次请求的响应
#[derive(Debug, Clone)]
pub struct ApiResponseBody {
    pub status: u16,
    pub body: String,
}

/// REST API 协议
#[derive(Debug, Clone)]
pub struct ApiProtocol {
    source_id: i64,
    url: String,
    method: Method,
    headers: Vec<(String, String)>,
    body: Option<Value>,
    data_path: Option<String>,
    poll_interval: Duration,
    reconnect_interval: Duration,
    timeout: Duration,
    base_tag: String,
    tag_prefix: Option<String>,
    provenance: Map<String, Value>,
}

impl ApiProtocol {
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn request(&self, client: &reqwest::Client) -> Result<ApiResponseBody, ConnectorError> {
        let mut request = client.request(self.method.clone(), &self.url);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &self.body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|err| ConnectorError::Transport(format!("request {}: {}", self.url, err)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ConnectorError::Transport(format!("read body: {}", err)))?;
        if !status.is_success() {
            return Err(ConnectorError::Transport(format!(
                "{} returned {}",
                self.url, status
            )));
        }
        Ok(ApiResponseBody {
            status: status.as_u16(),
            body,
        })
    }
}

fn select_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            _ => None,
        })
}

fn parse_headers(config: &SourceConfig) -> Result<Vec<(String, String)>, ConnectorError> {
    match config.lookup("headers") {
        None => Ok(Vec::new()),
        Some(Value::Object(map)) => Ok(map
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                (name.clone(), value)
            })
            .collect()),
        Some(_) => Err(ConnectorError::invalid("headers", "expected an object")),
    }
}

#[async_trait]
impl Protocol for ApiProtocol {
    type Session = reqwest::Client;
    type Payload = ApiResponseBody;

    const KIND: InterfaceType = InterfaceType::Api;

    fn initialize(config: &SourceConfig) -> Result<Self, ConnectorError> {
        require_fields(config, &["url", "method"])?;
        let url = string_field(config, "url")?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConnectorError::invalid("url", "expected http:// or https://"));
        }
        let method = string_field(config, "method")?
            .to_ascii_uppercase()
            .parse::<Method>()
            .map_err(|_| ConnectorError::invalid("method", "unknown HTTP method"))?;
        let timeout = match optional_u64(config, "timeout")? {
            Some(0) | None => Duration::from_millis(DEFAULT_TIMEOUT_MS),
            Some(ms) => Duration::from_millis(ms),
        };
        Ok(Self {
            source_id: config.id,
            provenance: provenance(&[("url", json!(url)), ("method", json!(method.as_str()))]),
            url,
            method,
            headers: parse_headers(config)?,
            body: config.lookup("body").cloned(),
            data_path: optional_string(config, "dataPath"),
            poll_interval: interval_field(config, "pollInterval", DEFAULT_POLL_MS)?,
            reconnect_interval: interval_field(config, "reconnectInterval", DEFAULT_RECONNECT_MS)?,
            timeout,
            base_tag: optional_string(config, "tagName").unwrap_or_else(|| "value".to_string()),
            tag_prefix: optional_string(config, "tagPrefix"),
        })
    }

    fn source_id(&self) -> i64 {
        self.source_id
    }

    fn reconnect_interval(&self) -> Duration {
        self.reconnect_interval
    }

    async fn connect(&self) -> Result<reqwest::Client, ConnectorError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(ConnectorError::transport)
    }

    async fn acquire(
        &self,
        client: reqwest::Client,
        tx: PayloadTx<ApiResponseBody>,
    ) -> Result<(), ConnectorError> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            match self.request(&client).await {
                Ok(response) => {
                    debug!(
                        target: "historian.protocol",
                        source_id = self.source_id,
                        status = response.status,
                        bytes = response.body.len(),
                        "api_polled"
                    );
                    tx.send(response);
                }
                Err(err) => tx.report_error(err),
            }
        }
    }

    fn process_data(&self, response: ApiResponseBody, received_at: i64) -> Vec<Reading> {
        let mut provenance = self.provenance.clone();
        provenance.insert("statusCode".to_string(), json!(response.status));

        let Some(path) = &self.data_path else {
            return normalize_json_text(
                self.source_id,
                &response.body,
                &self.base_tag,
                self.tag_prefix.as_deref(),
                received_at,
                &provenance,
            );
        };
        let document = match parse_json(&response.body) {
            Ok(document) => document,
            Err(_) => {
                return normalize_json_text(
                    self.source_id,
                    &response.body,
                    &self.base_tag,
                    self.tag_prefix.as_deref(),
                    received_at,
                    &provenance,
                )
            }
        };
        match select_path(&document, path) {
            Some(value @ Value::Object(_)) => flatten_json(value, self.tag_prefix.as_deref())
                .into_iter()
                .map(|(tag, value)| {
                    Reading::good(self.source_id, tag, value, received_at)
                        .with_provenance(&provenance)
                })
                .collect(),
            Some(value) => {
                let tag = match &self.tag_prefix {
                    Some(prefix) => format!("{}.{}", prefix, self.base_tag),
                    None => self.base_tag.clone(),
                };
                vec![Reading::good(self.source_id, tag, value.clone(), received_at)
                    .with_provenance(&provenance)]
            }
            None => Vec::new(),
        }
    }
}

//! MQTT 消息规整

use crate::json::{flatten_json, parse_json};
use domain::Reading;
use serde_json::{Map, Value};

/// MQTT 消息 → 读数。
///
/// 负载为 JSON 对象时以 topic 为前缀展平（`topic.a.b`）；
/// 其余负载（JSON 标量、数组或非 JSON）以 topic 为 tag，值为原始字符串。
pub fn normalize_mqtt_message(
    source_id: i64,
    topic: &str,
    payload: &[u8],
    timestamp: i64,
    provenance: &Map<String, Value>,
) -> Vec<Reading> {
    let text = String::from_utf8_lossy(payload);
    let readings = match parse_json(&text) {
        Ok(value @ Value::Object(_)) => flatten_json(&value, Some(topic))
            .into_iter()
            .map(|(tag, value)| Reading::good(source_id, tag, value, timestamp))
            .collect(),
        _ => vec![Reading::good(
            source_id,
            topic,
            Value::String(text.into_owned()),
            timestamp,
        )],
    };
    readings
        .into_iter()
        .map(|reading| {
            reading
                .with_metadata("topic", topic)
                .with_provenance(provenance)
        })
        .collect()
}

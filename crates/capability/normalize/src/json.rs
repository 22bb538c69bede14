//! JSON 报文展平

use crate::NormalizeError;
use domain::Reading;
use serde_json::{Map, Value};

/// 深度优先展平对象，路径以 `.` 连接。
///
/// 数组视为叶子值，不再递归；空对象不产生任何条目。
/// 顶层非对象值仅在给定 `prefix` 时产生一个条目。
pub fn flatten_json(value: &Value, prefix: Option<&str>) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    match value {
        Value::Object(map) => flatten_into(map, prefix, &mut out),
        other => {
            if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
                out.push((prefix.to_string(), other.clone()));
            }
        }
    }
    out
}

fn flatten_into(map: &Map<String, Value>, prefix: Option<&str>, out: &mut Vec<(String, Value)>) {
    for (key, value) in map {
        let path = join_path(prefix, key);
        match value {
            Value::Object(child) => flatten_into(child, Some(&path), out),
            leaf => out.push((path, leaf.clone())),
        }
    }
}

fn join_path(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{}.{}", prefix, key),
        _ => key.to_string(),
    }
}

/// 解析 JSON 文本。
pub fn parse_json(text: &str) -> Result<Value, NormalizeError> {
    serde_json::from_str::<Value>(text.trim())
        .map_err(|err| NormalizeError::InvalidJson(err.to_string()))
}

/// JSON 文本 → 读数。
///
/// - 对象：按 `tag_prefix` 展平；
/// - 其他 JSON 值：单个读数，tag 为 `base_tag`（有前缀时为 `prefix.base_tag`）；
/// - 解析失败：诊断读数 `<base_tag>_raw`，元数据带 `parseError`。
pub fn normalize_json_text(
    source_id: i64,
    text: &str,
    base_tag: &str,
    tag_prefix: Option<&str>,
    timestamp: i64,
    provenance: &Map<String, Value>,
) -> Vec<Reading> {
    match parse_json(text) {
        Ok(Value::Object(map)) => {
            let value = Value::Object(map);
            flatten_json(&value, tag_prefix)
                .into_iter()
                .map(|(tag, value)| {
                    Reading::good(source_id, tag, value, timestamp).with_provenance(provenance)
                })
                .collect()
        }
        Ok(other) => {
            let tag = join_path(tag_prefix, base_tag);
            vec![Reading::good(source_id, tag, other, timestamp).with_provenance(provenance)]
        }
        Err(err) => vec![diagnostic_reading(
            source_id,
            base_tag,
            text,
            &err,
            timestamp,
            provenance,
        )],
    }
}

/// 构造解析失败的诊断读数（不静默丢弃原始数据）。
pub fn diagnostic_reading(
    source_id: i64,
    base_tag: &str,
    raw: &str,
    err: &NormalizeError,
    timestamp: i64,
    provenance: &Map<String, Value>,
) -> Reading {
    Reading::good(
        source_id,
        format!("{}_raw", base_tag),
        Value::String(raw.to_string()),
        timestamp,
    )
    .with_metadata("parseError", err.to_string())
    .with_provenance(provenance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flatten_nested_objects_with_dot_path() {
        let value = json!({"a": {"b": {"c": 1}}, "d": [1, 2], "e": null});
        let flat = flatten_json(&value, None);
        assert_eq!(
            flat,
            vec![
                ("a.b.c".to_string(), json!(1)),
                ("d".to_string(), json!([1, 2])),
                ("e".to_string(), Value::Null),
            ]
        );
    }

    #[test]
    fn flatten_keeps_document_order() {
        let value = parse_json(r#"{"z": 1, "a": 2, "m": {"y": 3, "b": 4}}"#).unwrap();
        let tags: Vec<String> = flatten_json(&value, Some("root"))
            .into_iter()
            .map(|(tag, _)| tag)
            .collect();
        assert_eq!(tags, vec!["root.z", "root.a", "root.m.y", "root.m.b"]);
    }

    #[test]
    fn scalar_without_prefix_yields_nothing() {
        assert!(flatten_json(&json!(5), None).is_empty());
        assert!(flatten_json(&json!({}), None).is_empty());
        assert_eq!(flatten_json(&json!(5), Some("t")), vec![("t".to_string(), json!(5))]);
    }

    #[test]
    fn malformed_json_becomes_diagnostic_reading() {
        let readings = normalize_json_text(3, "{not json", "value", None, 10, &Map::new());
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].tag_name, "value_raw");
        assert_eq!(readings[0].value, json!("{not json"));
        assert!(readings[0].metadata.contains_key("parseError"));
    }
}

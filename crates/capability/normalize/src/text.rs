//! 文本/CSV 行规整

use domain::Reading;
use serde_json::{Map, Number, Value};

/// 数值强制转换：先整数、再浮点，失败保留字符串。
pub fn coerce_scalar(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::String(String::new());
    }
    if let Ok(value) = trimmed.parse::<i64>() {
        return Value::Number(value.into());
    }
    if let Ok(value) = trimmed.parse::<f64>() {
        if let Some(number) = Number::from_f64(value) {
            return Value::Number(number);
        }
    }
    Value::String(trimmed.to_string())
}

/// 按分隔符拆分 CSV 行，支持双引号包裹（`""` 转义）。
pub fn split_csv_line(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if current.trim().is_empty() => {
                current.clear();
                in_quotes = true;
            }
            c if c == delimiter && !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// CSV 行 → 每列一个读数。
///
/// tag 取配置的表头名，缺失或为空时为 `column_<index>`；行号记录在 `lineIndex`。
pub fn normalize_csv_line(
    source_id: i64,
    line: &str,
    line_index: u64,
    delimiter: char,
    headers: Option<&[String]>,
    timestamp: i64,
    provenance: &Map<String, Value>,
) -> Vec<Reading> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Vec::new();
    }
    split_csv_line(line, delimiter)
        .into_iter()
        .enumerate()
        .map(|(index, cell)| {
            let tag = headers
                .and_then(|headers| headers.get(index))
                .map(|name| name.trim())
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("column_{}", index));
            Reading::good(source_id, tag, coerce_scalar(&cell), timestamp)
                .with_metadata("lineIndex", line_index)
                .with_metadata("columnIndex", index as u64)
                .with_provenance(provenance)
        })
        .collect()
}

/// 纯文本行 → 单个读数（数值强制转换）。
pub fn normalize_text_line(
    source_id: i64,
    line: &str,
    base_tag: &str,
    timestamp: i64,
    provenance: &Map<String, Value>,
) -> Vec<Reading> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    vec![Reading::good(source_id, base_tag, coerce_scalar(trimmed), timestamp).with_provenance(provenance)]
}

//! NMEA 0183 语句解析

use domain::{Location, Reading};
use serde_json::{Map, Value};

/// 语句类型（`$` 之后到第一个 `,` 或 `*`）。
pub fn sentence_type(line: &str) -> Option<&str> {
    let body = line.strip_prefix('$')?;
    let end = body.find([',', '*']).unwrap_or(body.len());
    let kind = &body[..end];
    if kind.is_empty() { None } else { Some(kind) }
}

/// 校验和检查；无 `*hh` 后缀时返回 `None`。
pub fn checksum_valid(line: &str) -> Option<bool> {
    let body = line.strip_prefix('$')?;
    let (data, checksum) = body.rsplit_once('*')?;
    let expected = u8::from_str_radix(checksum.trim(), 16).ok()?;
    let actual = data.bytes().fold(0u8, |acc, byte| acc ^ byte);
    Some(actual == expected)
}

/// 度分格式（`ddmm.mmmm`）转十进制度，S/W 取负。
pub fn degrees_minutes_to_decimal(raw: &str, hemisphere: &str) -> Option<f64> {
    let value = raw.trim().parse::<f64>().ok()?;
    let degrees = (value / 100.0).floor();
    let minutes = value - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;
    match hemisphere.trim() {
        "S" | "W" => Some(-decimal),
        _ => Some(decimal),
    }
}

/// 解析 GGA 语句中的位置（纬度、经度、海拔）。
pub fn parse_gga(line: &str) -> Option<Location> {
    let data = line.split('*').next()?;
    let fields: Vec<&str> = data.split(',').collect();
    if fields.len() < 6 {
        return None;
    }
    let latitude = degrees_minutes_to_decimal(fields[2], fields[3])?;
    let longitude = degrees_minutes_to_decimal(fields[4], fields[5])?;
    let altitude = fields
        .get(9)
        .and_then(|value| value.trim().parse::<f64>().ok());
    Some(Location {
        latitude,
        longitude,
        altitude,
    })
}

fn is_gga(kind: &str) -> bool {
    kind == "GPGGA" || kind == "GNGGA"
}

/// NMEA 行 → 读数。
///
/// 返回 `None` 表示该行被类型白名单过滤；非 `$` 开头的行返回空结果，
/// 由调用方按普通文本处理。
pub fn normalize_nmea_line(
    source_id: i64,
    line: &str,
    allowed_types: Option<&[String]>,
    timestamp: i64,
    provenance: &Map<String, Value>,
) -> Option<Vec<Reading>> {
    let line = line.trim();
    let Some(kind) = sentence_type(line) else {
        return Some(Vec::new());
    };
    if let Some(allowed) = allowed_types {
        if !allowed.is_empty() && !allowed.iter().any(|item| item.eq_ignore_ascii_case(kind)) {
            return None;
        }
    }

    let mut sentence = Reading::good(source_id, kind, Value::String(line.to_string()), timestamp)
        .with_metadata("sentenceType", kind);
    if let Some(valid) = checksum_valid(line) {
        sentence = sentence.with_metadata("checksumValid", valid);
    }
    let mut readings = vec![sentence.with_provenance(provenance)];

    if is_gga(kind) {
        if let Some(location) = parse_gga(line) {
            readings.push(
                Reading::good(source_id, "gps_latitude", Value::from(location.latitude), timestamp)
                    .with_location(location)
                    .with_metadata("sentenceType", kind)
                    .with_provenance(provenance),
            );
            readings.push(
                Reading::good(source_id, "gps_longitude", Value::from(location.longitude), timestamp)
                    .with_location(location)
                    .with_metadata("sentenceType", kind)
                    .with_provenance(provenance),
            );
        }
    }
    Some(readings)
}

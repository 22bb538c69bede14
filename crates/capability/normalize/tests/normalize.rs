use historian_normalize::{
    DataFormat, RegisterBlock, RegisterKind, RegisterValues, TextFormat, normalize_mqtt_message,
    normalize_nmea_line, normalize_register_block,
};
use serde_json::{Map, Value, json};

fn modbus_provenance() -> Map<String, Value> {
    let mut provenance = Map::new();
    provenance.insert("host".to_string(), json!("10.0.0.5"));
    provenance.insert("port".to_string(), json!(502));
    provenance.insert("unitId".to_string(), json!(1));
    provenance
}

#[test]
fn modbus_block_of_two_yields_indexed_tags() {
    let block: RegisterBlock = serde_json::from_value(json!({
        "address": 40001,
        "type": "holding",
        "length": 2,
        "tagName": "temp"
    }))
    .expect("block");

    let readings = normalize_register_block(
        9,
        &block,
        &RegisterValues::Words(vec![212, 50]),
        1_000,
        &modbus_provenance(),
    );

    assert_eq!(readings.len(), 2);
    assert_eq!(readings[0].tag_name, "temp_0");
    assert_eq!(readings[0].value, json!(212));
    assert_eq!(readings[0].metadata["registerAddress"], json!(40001));
    assert_eq!(readings[1].tag_name, "temp_1");
    assert_eq!(readings[1].value, json!(50));
    assert_eq!(readings[1].metadata["registerAddress"], json!(40002));
    assert_eq!(readings[1].metadata["host"], json!("10.0.0.5"));
    assert!(readings.iter().all(|r| r.quality == 192));
}

#[test]
fn modbus_block_counts_match_length() {
    for length in 1u16..=6 {
        let block = RegisterBlock {
            address: 100,
            kind: RegisterKind::Input,
            length,
            tag_name: "p".to_string(),
        };
        let values = RegisterValues::Words((0..length).collect());
        let readings = normalize_register_block(1, &block, &values, 0, &Map::new());
        assert_eq!(readings.len(), length as usize);
        if length == 1 {
            assert_eq!(readings[0].tag_name, "p");
            assert_eq!(readings[0].metadata["registerAddress"], json!(100));
        } else {
            for (index, reading) in readings.iter().enumerate() {
                assert_eq!(reading.tag_name, format!("p_{}", index));
                assert_eq!(reading.metadata["registerAddress"], json!(100 + index));
            }
        }
    }
}

#[test]
fn mqtt_object_payload_is_prefixed_by_topic() {
    let readings = normalize_mqtt_message(
        4,
        "sensors/room1",
        br#"{"temperature":21.5,"humidity":40}"#,
        5,
        &Map::new(),
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
    assert_eq!(readings[0].metadata["topic"], json!("sensors/room1"));
}

#[test]
fn mqtt_non_object_payload_keeps_topic_tag() {
    let raw = normalize_mqtt_message(4, "plant/state", b"RUNNING", 5, &Map::new());
    assert_eq!(raw.len(), 1);
    assert_eq!(raw[0].tag_name, "plant/state");
    assert_eq!(raw[0].value, json!("RUNNING"));

    let number = normalize_mqtt_message(4, "plant/speed", b"12.5", 5, &Map::new());
    assert_eq!(number[0].tag_name, "plant/speed");
    assert_eq!(number[0].value, json!("12.5"));

    let array = normalize_mqtt_message(4, "plant/amps", b"[1,2]", 5, &Map::new());
    assert_eq!(array.len(), 1);
    assert_eq!(array[0].value, json!("[1,2]"));
}

#[test]
fn json_flattening_is_deterministic() {
    let format = TextFormat::default();
    let payload = r#"{"line":{"speed":3,"motor":{"amps":[1,2],"temp":71.2}},"ok":true}"#;
    let first = format.normalize(1, payload, 0, 42, &Map::new());
    let second = format.normalize(1, payload, 0, 42, &Map::new());
    assert_eq!(first, second);
    let tags: Vec<&str> = first.iter().map(|r| r.tag_name.as_str()).collect();
    assert_eq!(
        tags,
        vec!["line.speed", "line.motor.amps", "line.motor.temp", "ok"]
    );
    assert_eq!(first[1].value, json!([1, 2]));
}

#[test]
fn csv_uses_headers_or_column_index() {
    let mut format = TextFormat {
        format: DataFormat::Csv,
        ..TextFormat::default()
    };
    let readings = format.normalize(2, "12,abc,3.5", 7, 0, &Map::new());
    let tags: Vec<&str> = readings.iter().map(|r| r.tag_name.as_str()).collect();
    assert_eq!(tags, vec!["column_0", "column_1", "column_2"]);
    assert_eq!(readings[0].value, json!(12));
    assert_eq!(readings[1].value, json!("abc"));
    assert_eq!(readings[2].metadata["lineIndex"], json!(7));

    format.headers = Some(vec!["flow".to_string(), "".to_string()]);
    let readings = format.normalize(2, "12,abc,3.5", 8, 0, &Map::new());
    let tags: Vec<&str> = readings.iter().map(|r| r.tag_name.as_str()).collect();
    assert_eq!(tags, vec!["flow", "column_1", "column_2"]);
}

#[test]
fn gga_sentence_emits_location_readings() {
    let line = "$GPGGA,123519,4807.038,N,01131.000,W,1,08,0.9,545.4,M,46.9,M,,*4A";
    let readings = normalize_nmea_line(3, line, None, 0, &Map::new()).expect("accepted");
    assert_eq!(readings.len(), 3);
    assert_eq!(readings[0].tag_name, "GPGGA");
    assert_eq!(readings[1].tag_name, "gps_latitude");
    assert_eq!(readings[2].tag_name, "gps_longitude");

    let location = readings[2].location.expect("location");
    assert!((location.latitude - 48.1173).abs() < 1e-4);
    assert!(location.longitude < 0.0);
    assert_eq!(location.altitude, Some(545.4));
    assert_eq!(readings[1].location, readings[2].location);
}

#[test]
fn nmea_allow_list_drops_other_sentences() {
    let allow = vec!["GPRMC".to_string()];
    let line = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
    assert!(normalize_nmea_line(3, line, Some(&allow), 0, &Map::new()).is_none());

    let kept = normalize_nmea_line(3, "$GPRMC,1,2", Some(&allow), 0, &Map::new())
        .expect("accepted");
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].tag_name, "GPRMC");
}

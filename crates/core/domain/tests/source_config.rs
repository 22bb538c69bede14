use domain::{InterfaceType, ProtocolType, QUALITY_GOOD, Reading, SourceConfig};
use serde_json::json;

#[test]
fn source_config_parses_camel_case() {
    let config: SourceConfig = serde_json::from_value(json!({
        "id": 7,
        "name": "boiler",
        "interfaceType": "MODBUS",
        "protocolType": "MODBUS_TCP",
        "interfaceConfig": { "host": "10.0.0.5", "port": "502" },
        "protocolConfig": { "unitId": 1 },
        "userId": 3
    }))
    .expect("config");

    assert_eq!(config.interface_type, InterfaceType::Modbus);
    assert_eq!(config.protocol_type, ProtocolType::ModbusTcp);
    assert!(config.is_active);
    assert!(config.custom_config.is_empty());
    assert_eq!(config.lookup_u64("port"), Some(502));
    assert_eq!(config.lookup_u64("unitId"), Some(1));
    assert_eq!(config.lookup_str("host"), Some("10.0.0.5"));
}

#[test]
fn lookup_prefers_interface_config_and_skips_null() {
    let config: SourceConfig = serde_json::from_value(json!({
        "id": 1,
        "name": "probe",
        "interfaceType": "TCP",
        "protocolType": "CUSTOM",
        "interfaceConfig": { "port": 9000, "host": null },
        "protocolConfig": { "port": 1, "host": "plc.local" },
        "customConfig": { "topics": "a/b, c/d" }
    }))
    .expect("config");

    assert_eq!(config.lookup_u64("port"), Some(9000));
    assert_eq!(config.lookup_str("host"), Some("plc.local"));
    assert_eq!(
        config.lookup_str_list("topics"),
        Some(vec!["a/b".to_string(), "c/d".to_string()])
    );
}

#[test]
fn enum_tags_round_trip_through_strings() {
    for item in ProtocolType::ALL {
        let parsed: ProtocolType = item.as_str().parse().expect("protocol");
        assert_eq!(parsed, item);
    }
    assert_eq!("udp".parse::<InterfaceType>(), Ok(InterfaceType::Udp));
    assert!("CAN".parse::<InterfaceType>().is_err());
}

#[test]
fn reading_serializes_with_good_quality() {
    let reading = Reading::good(5, "temperature", json!(21.5), 1_700_000_000_000)
        .with_metadata("host", "10.0.0.5");
    let value = serde_json::to_value(&reading).expect("json");

    assert_eq!(value["sourceId"], 5);
    assert_eq!(value["tagName"], "temperature");
    assert_eq!(value["quality"], QUALITY_GOOD);
    assert_eq!(value["metadata"]["host"], "10.0.0.5");
    assert!(value.get("location").is_none());
}

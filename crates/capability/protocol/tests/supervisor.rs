use domain::{ConnectorPhase, InterfaceType, SourceConfig};
use historian_pipeline::{NoopWriter, ReadingPipeline, ReadingWriter, StorageReadingWriter};
use historian_protocol::{Connector, ConnectorError, ConnectorRegistry};
use historian_storage::{
    InMemoryLatestReadingStore, InMemoryReadingStore, LatestReadingStore, ReadingSink,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

fn source(id: i64, interface_type: &str, interface_config: Value) -> SourceConfig {
    serde_json::from_value(json!({
        "id": id,
        "name": format!("source-{}", id),
        "interfaceType": interface_type,
        "protocolType": "CUSTOM",
        "interfaceConfig": interface_config,
    }))
    .expect("source config")
}

struct Harness {
    history: Arc<InMemoryReadingStore>,
    latest: Arc<InMemoryLatestReadingStore>,
    pipeline: ReadingPipeline,
    connector: Arc<dyn Connector>,
}

fn harness(config: &SourceConfig) -> Harness {
    let history = Arc::new(InMemoryReadingStore::new());
    let latest = Arc::new(InMemoryLatestReadingStore::new());
    let writer: Arc<dyn ReadingWriter> = Arc::new(StorageReadingWriter::new(
        history.clone() as Arc<dyn ReadingSink>,
        latest.clone() as Arc<dyn LatestReadingStore>,
    ));
    let (pipeline, sender) = ReadingPipeline::spawn(config.id, writer);
    let connector = ConnectorRegistry::with_defaults()
        .build(config, sender)
        .expect("connector");
    Harness {
        history,
        latest,
        pipeline,
        connector,
    }
}

async fn wait_for(mut check: impl FnMut() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

async fn free_tcp_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    listener.local_addr().expect("addr").port()
}

fn free_udp_port() -> u16 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").expect("bind");
    socket.local_addr().expect("addr").port()
}

#[tokio::test]
async fn refused_connection_schedules_exactly_one_reconnect() {
    let port = free_tcp_port().await;
    let config = source(
        1,
        "TCP",
        json!({"host": "127.0.0.1", "port": port, "reconnectInterval": 60000}),
    );
    let harness = harness(&config);

    harness.connector.start().await;
    let status = harness.connector.status();
    assert!(!status.is_running);
    assert_eq!(status.phase, ConnectorPhase::ReconnectScheduled);
    assert!(status.reconnect_pending);
    assert_eq!(status.reconnect_attempts, 1);
    assert!(status.last_error.is_some());

    // 再次 start 立即重试，仍只保留一个定时器
    harness.connector.start().await;
    assert_eq!(harness.connector.status().reconnect_attempts, 2);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.connector.status().reconnect_attempts, 2);

    harness.connector.stop().await.expect("stop");
    let status = harness.connector.status();
    assert_eq!(status.phase, ConnectorPhase::Stopped);
    assert!(!status.reconnect_pending);
    harness.connector.stop().await.expect("second stop");
    harness.pipeline.shutdown().await;
}

#[tokio::test]
async fn short_reconnect_interval_keeps_retrying_until_stopped() {
    let port = free_tcp_port().await;
    let config = source(
        2,
        "TCP",
        json!({"host": "127.0.0.1", "port": port, "reconnectInterval": 20}),
    );
    let harness = harness(&config);

    harness.connector.start().await;
    let connector = harness.connector.clone();
    wait_for(move || connector.status().reconnect_attempts >= 3).await;

    harness.connector.stop().await.expect("stop");
    let attempts = harness.connector.status().reconnect_attempts;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.connector.status().reconnect_attempts, attempts);
    harness.pipeline.shutdown().await;
}

#[tokio::test]
async fn tcp_lines_are_persisted_and_stop_ends_ingestion() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        socket
            .write_all(b"{\"temp\":21.5}\n{\"temp\":22}\n")
            .await
            .expect("write");
        let _ = release_rx.await;
        let _ = socket.write_all(b"{\"temp\":99}\n").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
    });

    let config = source(3, "TCP", json!({"host": "127.0.0.1", "port": port}));
    let harness = harness(&config);
    harness.connector.start().await;
    assert!(harness.connector.status().is_running);

    let history = harness.history.clone();
    wait_for(move || history.len() == 2).await;
    let readings = harness.history.snapshot();
    assert_eq!(readings[0].tag_name, "temp");
    assert_eq!(readings[0].value, json!(21.5));
    assert_eq!(readings[0].metadata["host"], json!("127.0.0.1"));
    assert_eq!(readings[1].value, json!(22));
    let status = harness.connector.status();
    assert_eq!(status.readings_produced, 2);
    assert!(status.last_activity.is_some());

    let latest = harness
        .latest
        .get_latest(3, "temp")
        .await
        .expect("latest")
        .expect("present");
    assert_eq!(latest.value, json!(22));

    harness.connector.stop().await.expect("stop");
    assert!(!harness.connector.status().is_running);
    let _ = release_tx.send(());
    let _ = server.await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.history.len(), 2);
    harness.pipeline.shutdown().await;
}

#[tokio::test]
async fn udp_datagrams_are_persisted_with_remote_address() {
    let port = free_udp_port();
    let config = source(4, "UDP", json!({"host": "127.0.0.1", "port": port}));
    let harness = harness(&config);
    harness.connector.start().await;
    assert!(harness.connector.status().is_running);

    let client = tokio::net::UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("client");
    let client_addr = client.local_addr().expect("addr");
    client
        .send_to(br#"{"flow":3,"pump":{"on":true}}"#, ("127.0.0.1", port))
        .await
        .expect("send");

    let history = harness.history.clone();
    wait_for(move || history.len() == 2).await;
    let readings = harness.history.snapshot();
    assert_eq!(readings[0].tag_name, "flow");
    assert_eq!(readings[1].tag_name, "pump.on");
    assert_eq!(
        readings[0].metadata["remoteAddress"],
        json!(client_addr.to_string())
    );

    harness.connector.stop().await.expect("stop");
    harness.pipeline.shutdown().await;
}

#[tokio::test]
async fn file_source_tails_appended_rows() {
    let path = std::env::temp_dir().join(format!("historian-{}.csv", uuid::Uuid::new_v4()));
    std::fs::write(&path, "flow,temp\n1,20\n").expect("seed file");
    let config = source(
        5,
        "FILE",
        json!({"path": path.to_string_lossy(), "hasHeader": true, "pollInterval": 20}),
    );
    let harness = harness(&config);
    harness.connector.start().await;

    let history = harness.history.clone();
    wait_for(move || history.len() == 2).await;

    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&path)
        .expect("open");
    std::io::Write::write_all(&mut file, b"2,21\n").expect("append");

    let history = harness.history.clone();
    wait_for(move || history.len() == 4).await;
    let readings = harness.history.snapshot();
    assert_eq!(readings[2].tag_name, "flow");
    assert_eq!(readings[2].value, json!(2));
    let file_name = path
        .file_name()
        .expect("file name")
        .to_string_lossy()
        .into_owned();
    assert_eq!(readings[3].metadata["fileName"], json!(file_name));

    harness.connector.stop().await.expect("stop");
    harness.pipeline.shutdown().await;
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn registry_rejects_unsupported_and_invalid_sources() {
    let registry = ConnectorRegistry::with_defaults();
    let (pipeline, sender) = ReadingPipeline::spawn(6, Arc::new(NoopWriter));

    let usb = source(6, "USB", json!({}));
    assert_eq!(
        registry.build(&usb, sender.clone()).err(),
        Some(ConnectorError::Unsupported(InterfaceType::Usb))
    );

    let tcp = source(6, "TCP", json!({"host": "127.0.0.1"}));
    let err = registry.build(&tcp, sender).err().expect("validation error");
    assert_eq!(
        err,
        ConnectorError::ConfigValidation {
            missing: vec!["port".to_string()]
        }
    );
    assert!(err.is_config_error());
    pipeline.shutdown().await;
}

#[tokio::test]
async fn stop_during_connect_prevents_late_start() {
    // 接受 TCP 连接但从不回 ConnAck 的 broker
    let broker = TcpListener::bind("127.0.0.1:0").await.expect("broker");
    let port = broker.local_addr().expect("addr").port();
    let config = source(
        7,
        "MQTT",
        json!({
            "brokerUrl": format!("mqtt://127.0.0.1:{}", port),
            "topics": ["plant/#"],
            "connectTimeout": 500,
            "reconnectInterval": 20,
        }),
    );
    let harness = harness(&config);

    let connector = harness.connector.clone();
    let pending = tokio::spawn(async move { connector.start().await });
    let connector = harness.connector.clone();
    wait_for(move || connector.status().phase == ConnectorPhase::Starting).await;

    harness.connector.stop().await.expect("stop");
    assert_eq!(harness.connector.status().phase, ConnectorPhase::Stopped);

    // 连接超时在 stop 之后返回，不得再调度重连
    pending.await.expect("start task");
    tokio::time::sleep(Duration::from_millis(100)).await;
    let status = harness.connector.status();
    assert_eq!(status.phase, ConnectorPhase::Stopped);
    assert!(!status.is_running);
    assert!(!status.reconnect_pending);
    assert_eq!(status.reconnect_attempts, 0);
    assert_eq!(harness.history.len(), 0);

    harness.pipeline.shutdown().await;
    drop(broker);
}

#[tokio::test]
async fn malformed_tcp_lines_become_diagnostics_without_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        socket
            .write_all(b"\xff\xfe garbage\n{not json\n{\"temp\":1}\n")
            .await
            .expect("write");
        let _ = release_rx.await;
    });

    let config = source(8, "TCP", json!({"host": "127.0.0.1", "port": port}));
    let harness = harness(&config);
    harness.connector.start().await;

    let history = harness.history.clone();
    wait_for(move || history.len() == 3).await;
    let readings = harness.history.snapshot();
    let tags: Vec<&str> = readings.iter().map(|r| r.tag_name.as_str()).collect();
    assert_eq!(tags, vec!["value_raw", "value_raw", "temp"]);
    assert!(readings[0].metadata.contains_key("parseError"));
    assert!(readings[1].metadata.contains_key("parseError"));
    assert_eq!(readings[2].value, json!(1));

    let status = harness.connector.status();
    assert!(status.is_running);
    assert_eq!(status.phase, ConnectorPhase::Running);
    assert_eq!(status.reconnect_attempts, 0);

    harness.connector.stop().await.expect("stop");
    let _ = release_tx.send(());
    let _ = server.await;
    harness.pipeline.shutdown().await;
}

#[tokio::test]
async fn malformed_udp_datagrams_become_diagnostics() {
    let port = free_udp_port();
    let config = source(9, "UDP", json!({"host": "127.0.0.1", "port": port}));
    let harness = harness(&config);
    harness.connector.start().await;

    let client = tokio::net::UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("client");
    client
        .send_to(b"\xff\xfe\x00\x01", ("127.0.0.1", port))
        .await
        .expect("send");
    let history = harness.history.clone();
    wait_for(move || history.len() == 1).await;
    client
        .send_to(b"{\"flow\":", ("127.0.0.1", port))
        .await
        .expect("send");
    let history = harness.history.clone();
    wait_for(move || history.len() == 2).await;

    let readings = harness.history.snapshot();
    for reading in &readings {
        assert_eq!(reading.tag_name, "value_raw");
        assert!(reading.metadata.contains_key("parseError"));
    }
    assert!(harness.connector.status().is_running);

    harness.connector.stop().await.expect("stop");
    harness.pipeline.shutdown().await;
}

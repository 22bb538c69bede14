use async_trait::async_trait;
use domain::{InterfaceType, SourceConfig};
use historian_ingest::{ManagerError, SourceManager};
use historian_pipeline::{ReadingWriter, StorageReadingWriter};
use historian_protocol::{ConnectorError, ConnectorRegistry};
use historian_storage::{
    InMemoryLatestReadingStore, InMemoryReadingStore, InMemorySourceConfigStore,
    LatestReadingStore, ReadingSink, SourceConfigStore, StorageError,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

fn source(id: i64, interface_type: &str, active: bool, interface_config: Value) -> SourceConfig {
    serde_json::from_value(json!({
        "id": id,
        "name": format!("source-{}", id),
        "interfaceType": interface_type,
        "protocolType": "CUSTOM",
        "interfaceConfig": interface_config,
        "isActive": active,
    }))
    .expect("source config")
}

fn free_udp_port() -> u16 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").expect("bind");
    socket.local_addr().expect("addr").port()
}

fn udp_source(id: i64, port: u16) -> SourceConfig {
    source(id, "UDP", true, json!({"host": "127.0.0.1", "port": port}))
}

struct Fixture {
    store: Arc<InMemorySourceConfigStore>,
    history: Arc<InMemoryReadingStore>,
    manager: Arc<SourceManager>,
}

fn fixture(sources: Vec<SourceConfig>) -> Fixture {
    let store = Arc::new(InMemorySourceConfigStore::with_sources(sources));
    let history = Arc::new(InMemoryReadingStore::new());
    let latest = Arc::new(InMemoryLatestReadingStore::new());
    let writer: Arc<dyn ReadingWriter> = Arc::new(StorageReadingWriter::new(
        history.clone() as Arc<dyn ReadingSink>,
        latest as Arc<dyn LatestReadingStore>,
    ));
    let manager = Arc::new(SourceManager::new(
        store.clone() as Arc<dyn SourceConfigStore>,
        writer,
        ConnectorRegistry::with_defaults(),
    ));
    Fixture {
        store,
        history,
        manager,
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

async fn send_datagram(port: u16, payload: &[u8]) {
    let client = UdpSocket::bind("127.0.0.1:0").await.expect("client");
    client
        .send_to(payload, ("127.0.0.1", port))
        .await
        .expect("send");
}

#[tokio::test]
async fn initialize_starts_active_sources_once() {
    let port = free_udp_port();
    let fixture = fixture(vec![
        udp_source(1, port),
        source(2, "UDP", false, json!({"port": free_udp_port()})),
        source(3, "TCP", true, json!({"host": "127.0.0.1"})),
    ]);

    let (first, second) = tokio::join!(fixture.manager.initialize(), fixture.manager.initialize());
    let first = first.expect("initialize");
    assert_eq!(first, second.expect("shared initialize"));
    assert_eq!(first.started, vec![1]);
    assert_eq!(first.failed.len(), 1);
    assert_eq!(first.failed[0].source_id, 3);
    assert!(first.failed[0].error.contains("port"));
    assert!(fixture.manager.is_initialized());

    let again = fixture.manager.initialize().await.expect("initialize");
    assert_eq!(again, first);

    let statuses = fixture.manager.all_statuses();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].source_id, 1);
    assert!(statuses[0].is_running);
    assert!(fixture.manager.status(2).is_none());

    let debug = fixture.manager.debug_info();
    assert!(debug.initialized);
    assert_eq!(debug.tracked, 1);
    assert_eq!(debug.running, 1);
    assert_eq!(debug.registered_kinds.len(), 7);

    fixture.manager.shutdown().await;
}

#[tokio::test]
async fn start_source_rejects_inactive_and_unsupported() {
    let fixture = fixture(Vec::new());

    let inactive = source(10, "UDP", false, json!({"port": free_udp_port()}));
    let err = fixture.manager.start_source(inactive).await.unwrap_err();
    assert!(matches!(err, ManagerError::SourceInactive(10)));
    assert!(err.is_config_error());

    let usb = source(11, "USB", true, json!({}));
    let err = fixture.manager.start_source(usb).await.unwrap_err();
    assert!(matches!(
        err,
        ManagerError::Connector(ConnectorError::Unsupported(InterfaceType::Usb))
    ));
    assert!(err.is_config_error());
    assert!(fixture.manager.all_statuses().is_empty());
}

#[tokio::test]
async fn stop_source_ends_persistence() {
    let port = free_udp_port();
    let fixture = fixture(Vec::new());
    let status = fixture
        .manager
        .start_source(udp_source(20, port))
        .await
        .expect("start");
    assert!(status.is_running);

    send_datagram(port, br#"{"level":1}"#).await;
    let history = fixture.history.clone();
    wait_for(move || history.len() == 1).await;

    assert!(fixture.manager.stop_source(20).await.expect("stop"));
    assert!(fixture.manager.status(20).is_none());

    send_datagram(port, br#"{"level":2}"#).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fixture.history.len(), 1);

    assert!(!fixture.manager.stop_source(20).await.expect("second stop"));
}

#[tokio::test]
async fn start_source_replaces_existing_instance() {
    let port = free_udp_port();
    let fixture = fixture(Vec::new());
    fixture
        .manager
        .start_source(udp_source(30, port))
        .await
        .expect("start");
    // 旧实例先停止，同一端口可以重新绑定
    let status = fixture
        .manager
        .start_source(udp_source(30, port))
        .await
        .expect("restart with same port");
    assert!(status.is_running);
    assert_eq!(fixture.manager.all_statuses().len(), 1);

    send_datagram(port, br#"{"level":5}"#).await;
    let history = fixture.history.clone();
    wait_for(move || history.len() == 1).await;

    let report = fixture.manager.shutdown().await;
    assert_eq!(report.stopped, vec![30]);
    assert!(report.failed.is_empty());
    assert!(fixture.manager.all_statuses().is_empty());
}

#[tokio::test]
async fn restart_follows_persisted_config() {
    let port = free_udp_port();
    let fixture = fixture(vec![udp_source(40, port)]);
    fixture.manager.initialize().await.expect("initialize");

    let status = fixture
        .manager
        .restart_source(40)
        .await
        .expect("restart")
        .expect("still active");
    assert!(status.is_running);
    assert_eq!(fixture.manager.status(40).map(|s| s.source_id), Some(40));

    let mut disabled = udp_source(40, port);
    disabled.is_active = false;
    fixture.store.upsert_source(disabled).await.expect("upsert");
    assert!(fixture.manager.restart_source(40).await.expect("restart").is_none());
    assert!(fixture.manager.status(40).is_none());

    let err = fixture.manager.restart_source(99).await.unwrap_err();
    assert!(matches!(err, ManagerError::NotFound(99)));
}

#[tokio::test]
async fn remove_source_keeps_persisted_config() {
    let port = free_udp_port();
    let fixture = fixture(vec![udp_source(50, port)]);
    fixture.manager.initialize().await.expect("initialize");

    assert!(fixture.manager.remove_source(50).await.expect("remove"));
    assert!(fixture.manager.status(50).is_none());
    assert!(fixture.store.find_source(50).await.expect("find").is_some());
    assert!(!fixture.manager.remove_source(50).await.expect("remove again"));
}

struct FailingStore;

#[async_trait]
impl SourceConfigStore for FailingStore {
    async fn list_sources(&self) -> Result<Vec<SourceConfig>, StorageError> {
        Err(StorageError::new("database unavailable"))
    }

    async fn find_source(&self, _source_id: i64) -> Result<Option<SourceConfig>, StorageError> {
        Err(StorageError::new("database unavailable"))
    }

    async fn upsert_source(&self, config: SourceConfig) -> Result<SourceConfig, StorageError> {
        Ok(config)
    }

    async fn delete_source(&self, _source_id: i64) -> Result<bool, StorageError> {
        Ok(false)
    }
}

#[tokio::test]
async fn initialize_store_failure_can_be_retried() {
    let manager = SourceManager::new(
        Arc::new(FailingStore),
        Arc::new(historian_pipeline::NoopWriter),
        ConnectorRegistry::with_defaults(),
    );
    let err = manager.initialize().await.unwrap_err();
    assert!(matches!(err, ManagerError::Storage(_)));
    assert!(!manager.is_initialized());
    assert!(manager.initialize().await.is_err());
}

#[tokio::test]
async fn slow_connect_does_not_block_other_sources() {
    // 接受 TCP 连接但从不回 ConnAck 的 broker
    let broker = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("broker");
    let broker_port = broker.local_addr().expect("addr").port();
    let udp_port = free_udp_port();
    let fixture = fixture(vec![]);

    fixture
        .manager
        .start_source(udp_source(2, udp_port))
        .await
        .expect("udp start");

    let manager = fixture.manager.clone();
    let pending = tokio::spawn(async move {
        manager
            .start_source(source(
                1,
                "MQTT",
                true,
                json!({
                    "brokerUrl": format!("mqtt://127.0.0.1:{}", broker_port),
                    "topics": ["plant/line1"],
                    "connectTimeout": 3000,
                }),
            ))
            .await
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!pending.is_finished());

    let started = std::time::Instant::now();
    assert!(fixture.manager.stop_source(2).await.expect("stop udp"));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(fixture.manager.status(2).is_none());

    let status = pending.await.expect("join").expect("mqtt start");
    assert!(!status.is_running);
    assert!(status.reconnect_pending);
    assert!(fixture.manager.stop_source(1).await.expect("stop mqtt"));
    drop(broker);
}

//! 数据历史库采集服务：数据源控制面 HTTP API 与采集生命周期。

mod handlers;
mod middleware;
mod routes;
mod utils;

use historian_config::AppConfig;
use historian_ingest::SourceManager;
use historian_pipeline::StorageReadingWriter;
use historian_protocol::ConnectorRegistry;
use historian_storage::{
    InMemoryLatestReadingStore, InMemoryReadingStore, InMemorySourceConfigStore,
    LatestReadingStore, PgReadingStore, PgSourceConfigStore, ReadingSink, ReadingStore,
    RedisLatestReadingStore, SourceConfigStore, connect_pool,
};
use historian_telemetry::init_tracing;
use std::sync::Arc;
use tracing::info;

/// 处理器共享状态。
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SourceManager>,
    pub readings: Arc<dyn ReadingStore>,
    pub latest: Arc<dyn LatestReadingStore>,
    pub ingest_enabled: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    let state = build_state(&config).await?;
    if config.ingest_enabled {
        let report = state.manager.initialize().await?;
        info!(
            target: "historian.ingest",
            started = report.started.len(),
            failed = report.failed.len(),
            "ingest_ready"
        );
    } else {
        info!(target: "historian.ingest", "ingest_disabled");
    }

    let app = routes::create_router(state.clone());
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(addr = %config.http_addr, "http_listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let report = state.manager.shutdown().await;
    info!(
        stopped = report.stopped.len(),
        failed = report.failed.len(),
        "historian_stopped"
    );
    Ok(())
}

/// 按配置装配存储与数据源管理器：
/// 设置 `HISTORIAN_DATABASE_URL` 时使用 Postgres，否则使用内存存储；
/// 设置 `HISTORIAN_REDIS_URL` 时最新值写入 Redis。
async fn build_state(config: &AppConfig) -> Result<AppState, Box<dyn std::error::Error>> {
    let (sources, readings, sink): (
        Arc<dyn SourceConfigStore>,
        Arc<dyn ReadingStore>,
        Arc<dyn ReadingSink>,
    ) = match &config.database_url {
        Some(database_url) => {
            let pool = connect_pool(database_url).await?;
            let readings = Arc::new(PgReadingStore::new(pool.clone()));
            (
                Arc::new(PgSourceConfigStore::new(pool)) as Arc<dyn SourceConfigStore>,
                readings.clone() as Arc<dyn ReadingStore>,
                readings as Arc<dyn ReadingSink>,
            )
        }
        None => {
            let sources = match &config.sources_file {
                Some(path) => InMemorySourceConfigStore::from_json_file(path)?,
                None => InMemorySourceConfigStore::new(),
            };
            let readings = Arc::new(InMemoryReadingStore::new());
            (
                Arc::new(sources) as Arc<dyn SourceConfigStore>,
                readings.clone() as Arc<dyn ReadingStore>,
                readings as Arc<dyn ReadingSink>,
            )
        }
    };
    let latest: Arc<dyn LatestReadingStore> = match &config.redis_url {
        Some(redis_url) => Arc::new(RedisLatestReadingStore::connect_with_ttl(
            redis_url,
            config.redis_latest_ttl_seconds,
        )?),
        None => Arc::new(InMemoryLatestReadingStore::new()),
    };

    let writer = Arc::new(StorageReadingWriter::new(sink, latest.clone()));
    let manager = SourceManager::new(sources, writer, ConnectorRegistry::with_defaults());
    Ok(AppState {
        manager: Arc::new(manager),
        readings,
        latest,
        ingest_enabled: config.ingest_enabled,
    })
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown_requested");
    }
}

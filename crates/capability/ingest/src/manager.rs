//! 数据源注册表与生命周期管理

use crate::error::ManagerError;
use crate::report::{DebugInfo, InitReport, ShutdownReport, SourceFailure};
use domain::{ConnectorStatus, SourceConfig};
use futures::future::join_all;
use historian_pipeline::{ReadingPipeline, ReadingWriter};
use historian_protocol::{Connector, ConnectorError, ConnectorRegistry};
use historian_storage::SourceConfigStore;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

/// 单个数据源的变更锁，同时持有该数据源的写入任务。
type SourceSlot = Arc<Mutex<Option<ReadingPipeline>>>;

/// 数据源管理器：由 `main` 构造一次，通过 axum state 注入各处理器。
pub struct SourceManager {
    store: Arc<dyn SourceConfigStore>,
    writer: Arc<dyn ReadingWriter>,
    registry: ConnectorRegistry,
    /// 状态读取用的连接器快照
    connectors: RwLock<BTreeMap<i64, Arc<dyn Connector>>>,
    /// 按数据源 id 串行化变更；不同数据源互不等待
    slots: std::sync::Mutex<HashMap<i64, SourceSlot>>,
    init: OnceCell<InitReport>,
}

impl SourceManager {
    pub fn new(
        store: Arc<dyn SourceConfigStore>,
        writer: Arc<dyn ReadingWriter>,
        registry: ConnectorRegistry,
    ) -> Self {
        Self {
            store,
            writer,
            registry,
            connectors: RwLock::new(BTreeMap::new()),
            slots: std::sync::Mutex::new(HashMap::new()),
            init: OnceCell::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn SourceConfigStore> {
        &self.store
    }

    pub fn is_initialized(&self) -> bool {
        self.init.initialized()
    }

    /// 加载并启动全部活动数据源。
    ///
    /// 只执行一次：并发调用共享同一次初始化，之后返回首次结果。
    /// 读取配置失败时返回错误，下次调用会重试。
    pub async fn initialize(&self) -> Result<InitReport, ManagerError> {
        let report = self
            .init
            .get_or_try_init(|| async {
                let sources = self.store.list_active_sources().await?;
                info!(target: "historian.ingest", count = sources.len(), "sources_loading");

                // 各数据源并发连接，单个连接超时不拖慢其余
                let results = join_all(sources.into_iter().map(|config| async move {
                    let source_id = config.id;
                    (source_id, self.start_source(config).await)
                }))
                .await;

                let mut report = InitReport::default();
                for (source_id, result) in results {
                    match result {
                        Ok(_) => report.started.push(source_id),
                        Err(err) => {
                            warn!(
                                target: "historian.ingest",
                                source_id,
                                error = %err,
                                "source_init_failed"
                            );
                            report.failed.push(SourceFailure {
                                source_id,
                                error: err.to_string(),
                            });
                        }
                    }
                }
                info!(
                    target: "historian.ingest",
                    started = report.started.len(),
                    failed = report.failed.len(),
                    "sources_initialized"
                );
                Ok::<_, ManagerError>(report)
            })
            .await?;
        Ok(report.clone())
    }

    /// 构造、启动并登记数据源；已存在同 id 的连接器时先停止旧实例。
    ///
    /// 只有配置错误会返回；传输失败记录在状态中并由连接器自行重连。
    pub async fn start_source(&self, config: SourceConfig) -> Result<ConnectorStatus, ManagerError> {
        if !config.is_active {
            return Err(ManagerError::SourceInactive(config.id));
        }
        let slot = self.slot(config.id);
        let mut pipeline = slot.lock().await;
        self.start_locked(&mut pipeline, config).await
    }

    /// 停止并移除数据源；未登记时返回 `false`。
    pub async fn stop_source(&self, source_id: i64) -> Result<bool, ManagerError> {
        let slot = self.slot(source_id);
        let mut pipeline = slot.lock().await;
        let tracked = self.stop_locked(&mut pipeline, source_id).await?;
        if tracked {
            info!(target: "historian.ingest", source_id, "source_stop_requested");
        }
        Ok(tracked)
    }

    /// 停止后按持久化配置重新启动；配置已停用时保持停止并返回 `None`。
    pub async fn restart_source(
        &self,
        source_id: i64,
    ) -> Result<Option<ConnectorStatus>, ManagerError> {
        let slot = self.slot(source_id);
        let mut pipeline = slot.lock().await;
        if let Err(err) = self.stop_locked(&mut pipeline, source_id).await {
            warn!(target: "historian.ingest", source_id, error = %err, "source_stop_failed");
        }
        let config = self
            .store
            .find_source(source_id)
            .await?
            .ok_or(ManagerError::NotFound(source_id))?;
        if !config.is_active {
            info!(target: "historian.ingest", source_id, "source_inactive_not_restarted");
            return Ok(None);
        }
        let status = self.start_locked(&mut pipeline, config).await?;
        info!(target: "historian.ingest", source_id, "source_restarted");
        Ok(Some(status))
    }

    /// 停止并从注册表中移除；不修改持久化配置。
    pub async fn remove_source(&self, source_id: i64) -> Result<bool, ManagerError> {
        let slot = self.slot(source_id);
        let mut pipeline = slot.lock().await;
        let tracked = self.stop_locked(&mut pipeline, source_id).await?;
        if tracked {
            info!(target: "historian.ingest", source_id, "source_removed");
        }
        Ok(tracked)
    }

    pub fn status(&self, source_id: i64) -> Option<ConnectorStatus> {
        self.read_connectors()
            .get(&source_id)
            .map(|connector| connector.status())
    }

    /// 全部已登记数据源的状态，按 id 排序。
    pub fn all_statuses(&self) -> Vec<ConnectorStatus> {
        self.read_connectors()
            .values()
            .map(|connector| connector.status())
            .collect()
    }

    pub fn debug_info(&self) -> DebugInfo {
        let sources = self.all_statuses();
        DebugInfo {
            initialized: self.is_initialized(),
            tracked: sources.len(),
            running: sources.iter().filter(|status| status.is_running).count(),
            registered_kinds: self.registry.kinds(),
            sources,
            metrics: historian_telemetry::metrics().snapshot(),
        }
    }

    /// 停止全部连接器；单个失败不影响其余。
    pub async fn shutdown(&self) -> ShutdownReport {
        let slots: Vec<(i64, SourceSlot)> = self
            .lock_slots()
            .iter()
            .map(|(source_id, slot)| (*source_id, slot.clone()))
            .collect();
        let results = join_all(slots.into_iter().map(|(source_id, slot)| async move {
            let mut pipeline = slot.lock().await;
            (source_id, self.stop_locked(&mut pipeline, source_id).await)
        }))
        .await;

        let mut report = ShutdownReport::default();
        for (source_id, result) in results {
            match result {
                Ok(true) => report.stopped.push(source_id),
                Ok(false) => {}
                Err(err) => {
                    warn!(target: "historian.ingest", source_id, error = %err, "source_stop_failed");
                    report.failed.push(SourceFailure {
                        source_id,
                        error: err.to_string(),
                    });
                }
            }
        }
        report.stopped.sort_unstable();
        report.failed.sort_by_key(|failure| failure.source_id);
        info!(
            target: "historian.ingest",
            stopped = report.stopped.len(),
            failed = report.failed.len(),
            "sources_shutdown"
        );
        report
    }

    async fn start_locked(
        &self,
        slot: &mut Option<ReadingPipeline>,
        config: SourceConfig,
    ) -> Result<ConnectorStatus, ManagerError> {
        let source_id = config.id;
        if self.stop_locked(slot, source_id).await? {
            debug!(target: "historian.ingest", source_id, "source_replaced");
        }

        let (pipeline, sender) = ReadingPipeline::spawn(source_id, self.writer.clone());
        let connector = match self.registry.build(&config, sender) {
            Ok(connector) => connector,
            Err(err) => {
                pipeline.shutdown().await;
                warn!(
                    target: "historian.ingest",
                    source_id,
                    interface_type = %config.interface_type,
                    error = %err,
                    "source_config_rejected"
                );
                return Err(err.into());
            }
        };

        connector.start().await;
        let status = connector.status();
        *slot = Some(pipeline);
        self.write_connectors().insert(source_id, connector);
        info!(
            target: "historian.ingest",
            source_id,
            name = %config.name,
            interface_type = %config.interface_type,
            phase = ?status.phase,
            "source_registered"
        );
        Ok(status)
    }

    async fn stop_locked(
        &self,
        slot: &mut Option<ReadingPipeline>,
        source_id: i64,
    ) -> Result<bool, ConnectorError> {
        let connector = self.write_connectors().remove(&source_id);
        let pipeline = slot.take();
        let result = match &connector {
            Some(connector) => connector.stop().await,
            None => Ok(()),
        };
        if let Some(pipeline) = pipeline {
            let stats = pipeline.shutdown().await;
            debug!(
                target: "historian.ingest",
                source_id,
                persisted = stats.persisted,
                write_failures = stats.write_failures,
                dropped = stats.dropped,
                "source_pipeline_closed"
            );
        }
        result.map(|_| connector.is_some())
    }

    fn slot(&self, source_id: i64) -> SourceSlot {
        self.lock_slots().entry(source_id).or_default().clone()
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<i64, SourceSlot>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_connectors(&self) -> RwLockReadGuard<'_, BTreeMap<i64, Arc<dyn Connector>>> {
        self.connectors
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_connectors(&self) -> RwLockWriteGuard<'_, BTreeMap<i64, Arc<dyn Connector>>> {
        self.connectors
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

//! # 读数写入管道
//!
//! 每个已启动的数据源拥有独立的写入任务：
//!
//! - [`ReadingSender`]：连接器侧的发送端，按启动纪元打标
//! - [`ReadingGate`]：停止闸门，`close()` 返回后不再有任何读数落库
//! - [`ReadingPipeline`]：写入任务句柄，按产生顺序写入；失败的批次记录一次后丢弃，不重试
//! - [`StorageReadingWriter`]：历史表 + 最新值的双写

mod gate;
mod writer;

pub use gate::ReadingGate;
pub use writer::{NoopWriter, ReadingWriter, StorageReadingWriter};

use domain::Reading;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Pipeline 处理错误。
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("writer error: {0}")]
    Writer(String),
}

impl From<historian_storage::StorageError> for PipelineError {
    fn from(err: historian_storage::StorageError) -> Self {
        Self::Writer(err.to_string())
    }
}

/// 单个数据源的写入统计。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub persisted: u64,
    pub write_failures: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct StatsInner {
    persisted: AtomicU64,
    write_failures: AtomicU64,
    dropped: AtomicU64,
}

impl StatsInner {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            persisted: self.persisted.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn record_dropped(&self, count: u64) {
        self.dropped.fetch_add(count, Ordering::Relaxed);
        historian_telemetry::record_dropped_after_stop(count);
    }
}

struct ReadingBatch {
    epoch: u64,
    readings: Vec<Reading>,
}

/// 连接器侧发送端。
#[derive(Clone)]
pub struct ReadingSender {
    source_id: i64,
    tx: mpsc::UnboundedSender<ReadingBatch>,
    gate: ReadingGate,
    stats: Arc<StatsInner>,
}

impl ReadingSender {
    pub fn source_id(&self) -> i64 {
        self.source_id
    }

    pub fn gate(&self) -> &ReadingGate {
        &self.gate
    }

    /// 提交一批读数；闸门已关闭或纪元过期时丢弃并返回 false。
    pub fn send(&self, epoch: u64, readings: Vec<Reading>) -> bool {
        if readings.is_empty() {
            return true;
        }
        let count = readings.len() as u64;
        if !self.gate.accepts(epoch) {
            self.stats.record_dropped(count);
            return false;
        }
        if self.tx.send(ReadingBatch { epoch, readings }).is_err() {
            self.stats.record_dropped(count);
            return false;
        }
        true
    }
}

/// 单个数据源的写入任务句柄。
pub struct ReadingPipeline {
    source_id: i64,
    gate: ReadingGate,
    stats: Arc<StatsInner>,
    task: JoinHandle<()>,
}

impl ReadingPipeline {
    pub fn spawn(source_id: i64, writer: Arc<dyn ReadingWriter>) -> (Self, ReadingSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = ReadingGate::new();
        let stats = Arc::new(StatsInner::default());
        let task = tokio::spawn(run_writer(
            source_id,
            rx,
            writer,
            gate.clone(),
            stats.clone(),
        ));
        let sender = ReadingSender {
            source_id,
            tx,
            gate: gate.clone(),
            stats: stats.clone(),
        };
        (
            Self {
                source_id,
                gate,
                stats,
                task,
            },
            sender,
        )
    }

    pub fn source_id(&self) -> i64 {
        self.source_id
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.snapshot()
    }

    /// 关闭闸门并结束写入任务；返回后该数据源不再落库。
    pub async fn shutdown(self) -> PipelineStats {
        self.gate.close().await;
        self.task.abort();
        let _ = self.task.await;
        self.stats.snapshot()
    }
}

async fn run_writer(
    source_id: i64,
    mut rx: mpsc::UnboundedReceiver<ReadingBatch>,
    writer: Arc<dyn ReadingWriter>,
    gate: ReadingGate,
    stats: Arc<StatsInner>,
) {
    while let Some(batch) = rx.recv().await {
        let count = batch.readings.len() as u64;
        let _in_flight = gate.in_flight().await;
        if !gate.accepts(batch.epoch) {
            stats.record_dropped(count);
            tracing::debug!(
                target: "historian.pipeline",
                source_id,
                count,
                epoch = batch.epoch,
                "reading_batch_dropped"
            );
            continue;
        }

        let started = Instant::now();
        // 每批只写一次，失败不重试
        match writer.write_batch(&batch.readings).await {
            Ok(()) => {
                stats.persisted.fetch_add(count, Ordering::Relaxed);
                historian_telemetry::record_readings_persisted(count);
                historian_telemetry::record_write_latency_ms(started.elapsed().as_millis() as u64);
            }
            Err(err) => {
                stats.write_failures.fetch_add(1, Ordering::Relaxed);
                historian_telemetry::record_write_failure();
                tracing::warn!(
                    target: "historian.pipeline",
                    source_id,
                    count,
                    error = %err,
                    "reading_write_failed"
                );
            }
        }
    }
}

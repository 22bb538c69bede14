use crate::PipelineError;
use async_trait::async_trait;
use domain::Reading;
use historian_storage::{LatestReadingStore, ReadingSink};
use std::sync::Arc;

/// 读数写入器抽象。
#[async_trait]
pub trait ReadingWriter: Send + Sync {
    async fn write(&self, reading: &Reading) -> Result<(), PipelineError>;

    async fn write_batch(&self, readings: &[Reading]) -> Result<(), PipelineError> {
        for reading in readings {
            self.write(reading).await?;
        }
        Ok(())
    }
}

/// 空写入器（用于接线与测试）。
#[derive(Debug, Default)]
pub struct NoopWriter;

#[async_trait]
impl ReadingWriter for NoopWriter {
    async fn write(&self, _reading: &Reading) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// 基于存储层的写入器（历史表 + 最新值）。
#[derive(Clone)]
pub struct StorageReadingWriter {
    history: Arc<dyn ReadingSink>,
    latest: Arc<dyn LatestReadingStore>,
}

impl StorageReadingWriter {
    pub fn new(history: Arc<dyn ReadingSink>, latest: Arc<dyn LatestReadingStore>) -> Self {
        Self { history, latest }
    }
}

#[async_trait]
impl ReadingWriter for StorageReadingWriter {
    async fn write(&self, reading: &Reading) -> Result<(), PipelineError> {
        self.history.insert(reading).await?;
        self.latest.upsert_latest(reading).await?;
        Ok(())
    }

    async fn write_batch(&self, readings: &[Reading]) -> Result<(), PipelineError> {
        if readings.is_empty() {
            return Ok(());
        }
        self.history.insert_batch(readings).await?;
        for reading in readings {
            self.latest.upsert_latest(reading).await?;
        }
        Ok(())
    }
}

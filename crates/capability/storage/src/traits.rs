//! 存储接口 Trait 定义
//!
//! - ReadingSink：读数写入（持久化管道的下游）
//! - ReadingStore：历史读数查询
//! - LatestReadingStore：每个 tag 的最新值
//! - SourceConfigStore：数据源配置
//!
//! 所有接口返回 StorageError，使用 async_trait 支持动态分发。

use crate::error::StorageError;
use crate::models::ReadingQuery;
use async_trait::async_trait;
use domain::{Reading, SourceConfig};

/// 读数写入接口
#[async_trait]
pub trait ReadingSink: Send + Sync {
    /// 写入单条读数
    async fn insert(&self, reading: &Reading) -> Result<(), StorageError>;

    /// 批量写入，默认逐条写入并在首个错误处返回。
    async fn insert_batch(&self, readings: &[Reading]) -> Result<(), StorageError> {
        for reading in readings {
            self.insert(reading).await?;
        }
        Ok(())
    }
}

/// 历史读数存储接口
#[async_trait]
pub trait ReadingStore: ReadingSink {
    async fn query_readings(&self, query: &ReadingQuery) -> Result<Vec<Reading>, StorageError>;
}

/// 最新值存储接口
#[async_trait]
pub trait LatestReadingStore: Send + Sync {
    /// 写入最新值（同一 tag 以时间戳较新的为准）
    async fn upsert_latest(&self, reading: &Reading) -> Result<(), StorageError>;

    async fn get_latest(
        &self,
        source_id: i64,
        tag_name: &str,
    ) -> Result<Option<Reading>, StorageError>;

    /// 列出某个数据源所有 tag 的最新值，按 tag 排序
    async fn list_latest(&self, source_id: i64) -> Result<Vec<Reading>, StorageError>;
}

/// 数据源配置存储接口
#[async_trait]
pub trait SourceConfigStore: Send + Sync {
    async fn list_sources(&self) -> Result<Vec<SourceConfig>, StorageError>;

    /// 仅返回 `is_active = true` 的数据源
    async fn list_active_sources(&self) -> Result<Vec<SourceConfig>, StorageError> {
        let sources = self.list_sources().await?;
        Ok(sources.into_iter().filter(|source| source.is_active).collect())
    }

    async fn find_source(&self, source_id: i64) -> Result<Option<SourceConfig>, StorageError>;

    /// 新增或覆盖
    async fn upsert_source(&self, config: SourceConfig) -> Result<SourceConfig, StorageError>;

    async fn delete_source(&self, source_id: i64) -> Result<bool, StorageError>;
}

//! 历史读数内存实现

use crate::error::StorageError;
use crate::models::{ReadingQuery, TimeOrder};
use crate::traits::{ReadingSink, ReadingStore};
use domain::Reading;
use std::sync::RwLock;

/// 历史读数内存存储（按写入顺序追加）
pub struct InMemoryReadingStore {
    readings: RwLock<Vec<Reading>>,
}

impl InMemoryReadingStore {
    pub fn new() -> Self {
        Self {
            readings: RwLock::new(Vec::new()),
        }
    }

    /// 读数总数（用于测试）
    pub fn len(&self) -> usize {
        self.readings.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按写入顺序返回全部读数（用于测试）
    pub fn snapshot(&self) -> Vec<Reading> {
        self.readings
            .read()
            .map(|items| items.clone())
            .unwrap_or_default()
    }
}

impl Default for InMemoryReadingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ReadingSink for InMemoryReadingStore {
    async fn insert(&self, reading: &Reading) -> Result<(), StorageError> {
        let mut readings = self
            .readings
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        readings.push(reading.clone());
        Ok(())
    }

    async fn insert_batch(&self, batch: &[Reading]) -> Result<(), StorageError> {
        let mut readings = self
            .readings
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        readings.extend_from_slice(batch);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ReadingStore for InMemoryReadingStore {
    async fn query_readings(&self, query: &ReadingQuery) -> Result<Vec<Reading>, StorageError> {
        let readings = self
            .readings
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<Reading> = readings
            .iter()
            .filter(|reading| reading.source_id == query.source_id)
            .filter(|reading| {
                query
                    .tag_name
                    .as_deref()
                    .is_none_or(|tag| reading.tag_name == tag)
            })
            .filter(|reading| query.from_ms.is_none_or(|from| reading.timestamp >= from))
            .filter(|reading| query.to_ms.is_none_or(|to| reading.timestamp <= to))
            .cloned()
            .collect();
        // 稳定排序，同一时间戳保持写入顺序
        items.sort_by_key(|reading| reading.timestamp);
        if query.order == TimeOrder::Desc {
            items.reverse();
        }
        if query.limit > 0 {
            items.truncate(query.limit as usize);
        }
        Ok(items)
    }
}

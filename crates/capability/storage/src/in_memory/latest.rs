//! 最新值内存实现

use crate::error::StorageError;
use crate::traits::LatestReadingStore;
use domain::Reading;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// 最新值内存存储，键为 (source_id, tag_name)
pub struct InMemoryLatestReadingStore {
    latest: RwLock<BTreeMap<(i64, String), Reading>>,
}

impl InMemoryLatestReadingStore {
    pub fn new() -> Self {
        Self {
            latest: RwLock::new(BTreeMap::new()),
        }
    }

    /// 最新值数量（用于测试）
    pub fn len(&self) -> usize {
        self.latest.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryLatestReadingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LatestReadingStore for InMemoryLatestReadingStore {
    async fn upsert_latest(&self, reading: &Reading) -> Result<(), StorageError> {
        let mut latest = self
            .latest
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let key = (reading.source_id, reading.tag_name.clone());
        match latest.get(&key) {
            Some(existing) if existing.timestamp > reading.timestamp => {}
            _ => {
                latest.insert(key, reading.clone());
            }
        }
        Ok(())
    }

    async fn get_latest(
        &self,
        source_id: i64,
        tag_name: &str,
    ) -> Result<Option<Reading>, StorageError> {
        let latest = self
            .latest
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(latest.get(&(source_id, tag_name.to_string())).cloned())
    }

    async fn list_latest(&self, source_id: i64) -> Result<Vec<Reading>, StorageError> {
        let latest = self
            .latest
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(latest
            .iter()
            .filter(|((id, _), _)| *id == source_id)
            .map(|(_, reading)| reading.clone())
            .collect())
    }
}

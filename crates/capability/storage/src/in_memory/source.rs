//! 数据源配置内存实现

use crate::error::StorageError;
use crate::traits::SourceConfigStore;
use domain::SourceConfig;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

/// 数据源配置内存存储（按 id 排序）
pub struct InMemorySourceConfigStore {
    sources: RwLock<BTreeMap<i64, SourceConfig>>,
}

impl InMemorySourceConfigStore {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(BTreeMap::new()),
        }
    }

    /// 使用给定配置预置存储
    pub fn with_sources(sources: impl IntoIterator<Item = SourceConfig>) -> Self {
        let map = sources
            .into_iter()
            .map(|source| (source.id, source))
            .collect();
        Self {
            sources: RwLock::new(map),
        }
    }

    /// 从 JSON 文件（`SourceConfig` 数组）加载
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|err| StorageError::new(format!("read {}: {}", path.display(), err)))?;
        let sources: Vec<SourceConfig> = serde_json::from_str(&raw)?;
        Ok(Self::with_sources(sources))
    }

    pub fn len(&self) -> usize {
        self.sources.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemorySourceConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SourceConfigStore for InMemorySourceConfigStore {
    async fn list_sources(&self) -> Result<Vec<SourceConfig>, StorageError> {
        let sources = self
            .sources
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(sources.values().cloned().collect())
    }

    async fn find_source(&self, source_id: i64) -> Result<Option<SourceConfig>, StorageError> {
        let sources = self
            .sources
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(sources.get(&source_id).cloned())
    }

    async fn upsert_source(&self, config: SourceConfig) -> Result<SourceConfig, StorageError> {
        let mut sources = self
            .sources
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        sources.insert(config.id, config.clone());
        Ok(config)
    }

    async fn delete_source(&self, source_id: i64) -> Result<bool, StorageError> {
        let mut sources = self
            .sources
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(sources.remove(&source_id).is_some())
    }
}

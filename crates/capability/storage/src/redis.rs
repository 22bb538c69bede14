//! Redis 最新值实现
//!
//! 键格式：`source:{source_id}:tag:{tag_name}:latest`，值为读数 JSON。

use crate::error::StorageError;
use crate::traits::LatestReadingStore;
use domain::Reading;
use redis::AsyncCommands;

fn latest_key(source_id: i64, tag_name: &str) -> String {
    format!("source:{}:tag:{}:latest", source_id, tag_name)
}

/// Redis 最新值存储
pub struct RedisLatestReadingStore {
    client: redis::Client,
    ttl_seconds: Option<u64>,
}

impl RedisLatestReadingStore {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            ttl_seconds: None,
        }
    }

    pub fn connect(redis_url: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self::new(client))
    }

    /// TTL 为 0 或未设置时不过期
    pub fn connect_with_ttl(
        redis_url: &str,
        ttl_seconds: Option<u64>,
    ) -> Result<Self, StorageError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            ttl_seconds: ttl_seconds.filter(|ttl| *ttl > 0),
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StorageError> {
        Ok(self.client.get_multiplexed_tokio_connection().await?)
    }
}

#[async_trait::async_trait]
impl LatestReadingStore for RedisLatestReadingStore {
    async fn upsert_latest(&self, reading: &Reading) -> Result<(), StorageError> {
        let mut connection = self.connection().await?;
        let key = latest_key(reading.source_id, &reading.tag_name);

        let existing: Option<String> = connection.get(&key).await?;
        if let Some(existing) = existing {
            if let Ok(current) = serde_json::from_str::<Reading>(&existing) {
                if current.timestamp > reading.timestamp {
                    return Ok(());
                }
            }
        }

        let data = serde_json::to_string(reading)?;
        match self.ttl_seconds {
            Some(ttl) => connection.set_ex::<_, _, ()>(key, data, ttl).await?,
            None => connection.set::<_, _, ()>(key, data).await?,
        }
        Ok(())
    }

    async fn get_latest(
        &self,
        source_id: i64,
        tag_name: &str,
    ) -> Result<Option<Reading>, StorageError> {
        let mut connection = self.connection().await?;
        let data: Option<String> = connection.get(latest_key(source_id, tag_name)).await?;
        let Some(data) = data else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&data)?))
    }

    async fn list_latest(&self, source_id: i64) -> Result<Vec<Reading>, StorageError> {
        let mut connection = self.connection().await?;
        let pattern = format!("source:{}:tag:*:latest", source_id);
        let mut cursor: u64 = 0;
        let mut items = Vec::new();
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut connection)
                .await?;
            for key in keys {
                let data: Option<String> = connection.get(&key).await?;
                let Some(data) = data else {
                    continue;
                };
                items.push(serde_json::from_str::<Reading>(&data)?);
            }
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }
        items.sort_by(|a, b| a.tag_name.cmp(&b.tag_name));
        Ok(items)
    }
}

//! Postgres 数据源配置实现

use crate::error::StorageError;
use crate::traits::SourceConfigStore;
use domain::{InterfaceType, ProtocolType, SourceConfig};
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const SELECT_SOURCE: &str = "select id, name, interface_type, protocol_type, \
     interface_config::text as interface_config, \
     protocol_config::text as protocol_config, \
     custom_config::text as custom_config, \
     is_active, user_id \
     from data_sources";

pub struct PgSourceConfigStore {
    pub pool: PgPool,
}

impl PgSourceConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_object(raw: Option<String>) -> Result<Map<String, Value>, StorageError> {
    match raw {
        Some(text) => Ok(serde_json::from_str(&text)?),
        None => Ok(Map::new()),
    }
}

fn row_to_source(row: &PgRow) -> Result<SourceConfig, StorageError> {
    let interface_type: String = row.try_get("interface_type")?;
    let protocol_type: String = row.try_get("protocol_type")?;
    Ok(SourceConfig {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        interface_type: interface_type
            .parse::<InterfaceType>()
            .map_err(StorageError::new)?,
        protocol_type: protocol_type
            .parse::<ProtocolType>()
            .map_err(StorageError::new)?,
        interface_config: parse_object(row.try_get("interface_config")?)?,
        protocol_config: parse_object(row.try_get("protocol_config")?)?,
        custom_config: parse_object(row.try_get("custom_config")?)?,
        is_active: row.try_get("is_active")?,
        user_id: row.try_get("user_id")?,
    })
}

#[async_trait::async_trait]
impl SourceConfigStore for PgSourceConfigStore {
    async fn list_sources(&self) -> Result<Vec<SourceConfig>, StorageError> {
        let sql = format!("{SELECT_SOURCE} order by id");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_source).collect()
    }

    async fn list_active_sources(&self) -> Result<Vec<SourceConfig>, StorageError> {
        let sql = format!("{SELECT_SOURCE} where is_active = true order by id");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_source).collect()
    }

    async fn find_source(&self, source_id: i64) -> Result<Option<SourceConfig>, StorageError> {
        let sql = format!("{SELECT_SOURCE} where id = $1");
        let row = sqlx::query(&sql)
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_source).transpose()
    }

    async fn upsert_source(&self, config: SourceConfig) -> Result<SourceConfig, StorageError> {
        sqlx::query(
            "insert into data_sources \
             (id, name, interface_type, protocol_type, interface_config, protocol_config, \
              custom_config, is_active, user_id) \
             values ($1, $2, $3, $4, $5::jsonb, $6::jsonb, $7::jsonb, $8, $9) \
             on conflict (id) do update set \
             name = excluded.name, \
             interface_type = excluded.interface_type, \
             protocol_type = excluded.protocol_type, \
             interface_config = excluded.interface_config, \
             protocol_config = excluded.protocol_config, \
             custom_config = excluded.custom_config, \
             is_active = excluded.is_active, \
             user_id = excluded.user_id",
        )
        .bind(config.id)
        .bind(&config.name)
        .bind(config.interface_type.as_str())
        .bind(config.protocol_type.as_str())
        .bind(serde_json::to_string(&config.interface_config)?)
        .bind(serde_json::to_string(&config.protocol_config)?)
        .bind(serde_json::to_string(&config.custom_config)?)
        .bind(config.is_active)
        .bind(config.user_id)
        .execute(&self.pool)
        .await?;
        Ok(config)
    }

    async fn delete_source(&self, source_id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query("delete from data_sources where id = $1")
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

//! Postgres 历史读数实现

use crate::error::StorageError;
use crate::models::{ReadingQuery, TimeOrder};
use crate::traits::{ReadingSink, ReadingStore};
use domain::{Location, Reading};
use serde_json::{Map, Value};
use sqlx::{PgPool, Row};

const INSERT_READING: &str = "insert into readings \
     (source_id, tag_name, ts, value, quality, location, metadata) \
     values ($1, $2, to_timestamp($3 / 1000.0), $4::jsonb, $5, $6::jsonb, $7::jsonb)";

pub struct PgReadingStore {
    pub pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }
}

struct EncodedReading {
    value: String,
    location: Option<String>,
    metadata: String,
}

fn encode(reading: &Reading) -> Result<EncodedReading, StorageError> {
    let location = match &reading.location {
        Some(location) => Some(serde_json::to_string(location)?),
        None => None,
    };
    Ok(EncodedReading {
        value: serde_json::to_string(&reading.value)?,
        location,
        metadata: serde_json::to_string(&reading.metadata)?,
    })
}

#[async_trait::async_trait]
impl ReadingSink for PgReadingStore {
    async fn insert(&self, reading: &Reading) -> Result<(), StorageError> {
        let encoded = encode(reading)?;
        sqlx::query(INSERT_READING)
            .bind(reading.source_id)
            .bind(&reading.tag_name)
            .bind(reading.timestamp as f64)
            .bind(encoded.value)
            .bind(reading.quality)
            .bind(encoded.location)
            .bind(encoded.metadata)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_batch(&self, readings: &[Reading]) -> Result<(), StorageError> {
        if readings.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for reading in readings {
            let encoded = encode(reading)?;
            sqlx::query(INSERT_READING)
                .bind(reading.source_id)
                .bind(&reading.tag_name)
                .bind(reading.timestamp as f64)
                .bind(encoded.value)
                .bind(reading.quality)
                .bind(encoded.location)
                .bind(encoded.metadata)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ReadingStore for PgReadingStore {
    async fn query_readings(&self, query: &ReadingQuery) -> Result<Vec<Reading>, StorageError> {
        let order_by = match query.order {
            TimeOrder::Asc => "asc",
            TimeOrder::Desc => "desc",
        };
        let sql = format!(
            "select source_id, tag_name, \
             (extract(epoch from ts) * 1000)::bigint as ts_ms, \
             value::text as value_text, quality, \
             location::text as location_text, metadata::text as metadata_text \
             from readings \
             where source_id = $1 \
             and ($2::text is null or tag_name = $2) \
             and ($3::float8 is null or ts >= to_timestamp($3 / 1000.0)) \
             and ($4::float8 is null or ts <= to_timestamp($4 / 1000.0)) \
             order by ts {order_by}, id {order_by} \
             limit $5"
        );
        let limit = if query.limit > 0 { Some(query.limit) } else { None };
        let rows = sqlx::query(&sql)
            .bind(query.source_id)
            .bind(query.tag_name.as_deref())
            .bind(query.from_ms.map(|v| v as f64))
            .bind(query.to_ms.map(|v| v as f64))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let value_text: String = row.try_get("value_text")?;
            let location_text: Option<String> = row.try_get("location_text")?;
            let metadata_text: Option<String> = row.try_get("metadata_text")?;
            let location = match location_text {
                Some(text) => Some(serde_json::from_str::<Location>(&text)?),
                None => None,
            };
            let metadata = match metadata_text {
                Some(text) => serde_json::from_str::<Map<String, Value>>(&text)?,
                None => Map::new(),
            };
            items.push(Reading {
                source_id: row.try_get("source_id")?,
                tag_name: row.try_get("tag_name")?,
                value: serde_json::from_str(&value_text)?,
                quality: row.try_get("quality")?,
                timestamp: row.try_get("ts_ms")?,
                location,
                metadata,
            });
        }
        Ok(items)
    }
}

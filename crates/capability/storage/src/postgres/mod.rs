//! # PostgreSQL 存储实现模块
//!
//! 生产环境使用，所有 SQL 均为参数化查询。
//!
//! ## 包含的实现
//!
//! - **ReadingStore** (`reading.rs`)：历史读数写入与查询
//! - **SourceConfigStore** (`source.rs`)：数据源配置
//!
//! ## 数据库模式要求
//!
//! ```sql
//! create table data_sources (
//!     id bigint primary key,
//!     name text not null,
//!     interface_type text not null,
//!     protocol_type text not null,
//!     interface_config jsonb not null default '{}',
//!     protocol_config jsonb not null default '{}',
//!     custom_config jsonb not null default '{}',
//!     is_active boolean not null default true,
//!     user_id bigint
//! );
//!
//! create table readings (
//!     id bigserial primary key,
//!     source_id bigint not null,
//!     tag_name text not null,
//!     ts timestamptz not null,
//!     value jsonb not null,
//!     quality integer not null,
//!     location jsonb,
//!     metadata jsonb not null default '{}'
//! );
//! create index idx_readings_source_tag_ts on readings (source_id, tag_name, ts);
//! ```
//!
//! JSON 列统一以文本绑定后 `::jsonb` 转换，读取时 `::text` 再反序列化。

pub mod reading;
pub mod source;

pub use reading::*;
pub use source::*;

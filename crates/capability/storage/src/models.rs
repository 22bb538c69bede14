//! 存储查询模型

/// 时间排序方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeOrder {
    #[default]
    Asc,
    Desc,
}

/// 历史读数查询条件
#[derive(Debug, Clone)]
pub struct ReadingQuery {
    pub source_id: i64,
    /// 为空时返回该数据源的全部 tag
    pub tag_name: Option<String>,
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
    /// 0 表示不限制
    pub limit: i64,
    pub order: TimeOrder,
}

impl ReadingQuery {
    pub fn for_source(source_id: i64) -> Self {
        Self {
            source_id,
            tag_name: None,
            from_ms: None,
            to_ms: None,
            limit: 0,
            order: TimeOrder::Asc,
        }
    }

    pub fn with_tag(mut self, tag_name: impl Into<String>) -> Self {
        self.tag_name = Some(tag_name.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }
}

//! 读数查询 handlers
//!
//! - GET /api/sources/{id}/readings

use crate::AppState;
use crate::handlers::sources::SourcePath;
use crate::utils::response::{bad_request_error, reading_to_dto, storage_error};
use api_contract::{ApiResponse, ReadingDto, ReadingsQueryParams};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use historian_storage::{ReadingQuery, TimeOrder};

const DEFAULT_LIMIT: i64 = 1000;
const MAX_LIMIT: i64 = 5000;

pub async fn list_readings(
    State(state): State<AppState>,
    Path(path): Path<SourcePath>,
    Query(query): Query<ReadingsQueryParams>,
) -> Response {
    if query.latest {
        return latest_readings(&state, path.source_id, query.tag.as_deref()).await;
    }
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return bad_request_error("from must be <= to");
        }
    }
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if limit <= 0 || limit > MAX_LIMIT {
        return bad_request_error("limit out of range");
    }
    let order = match parse_order(query.order.as_deref()) {
        Ok(order) => order,
        Err(response) => return response,
    };
    let options = ReadingQuery {
        source_id: path.source_id,
        tag_name: query.tag,
        from_ms: query.from,
        to_ms: query.to,
        limit,
        order,
    };
    match state.readings.query_readings(&options).await {
        Ok(items) => {
            let data: Vec<ReadingDto> = items.into_iter().map(reading_to_dto).collect();
            (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
        }
        Err(err) => storage_error(err),
    }
}

async fn latest_readings(state: &AppState, source_id: i64, tag: Option<&str>) -> Response {
    let result = match tag {
        Some(tag) => state
            .latest
            .get_latest(source_id, tag)
            .await
            .map(|item| item.into_iter().collect::<Vec<_>>()),
        None => state.latest.list_latest(source_id).await,
    };
    match result {
        Ok(items) => {
            let data: Vec<ReadingDto> = items.into_iter().map(reading_to_dto).collect();
            (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
        }
        Err(err) => storage_error(err),
    }
}

fn parse_order(value: Option<&str>) -> Result<TimeOrder, Response> {
    match value.map(|value| value.trim().to_ascii_lowercase()) {
        None => Ok(TimeOrder::Asc),
        Some(value) if value == "asc" => Ok(TimeOrder::Asc),
        Some(value) if value == "desc" => Ok(TimeOrder::Desc),
        Some(_) => Err(bad_request_error("order must be asc or desc")),
    }
}

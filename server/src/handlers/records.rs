//! `/records` 端点
//!
//! 同一组 handler 同时挂在 `/api` 和 `/api/tables/:table` 下，
//! 由 [`Target`] 根据路径决定操作哪张表。

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequestParts, Path, Query,
    },
    http::request::Parts,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use tablegate::{Crud, Record, Row};

use crate::error::{ApiError, Envelope, Result};
use crate::state::AppState;

/// 本次请求操作的表
pub struct Target(pub Arc<dyn Crud>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Target {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        match Option::<Path<String>>::from_request_parts(parts, state).await {
            Ok(Some(Path(table))) => state.table(&table).map(Target),
            _ => Ok(Target(state.default_table())),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub filters: Value,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub filters: Value,
}

pub fn record_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/records",
            get(list_records)
                .post(create_record)
                .put(update_records)
                .delete(delete_records),
        )
        .route("/records/filter", get(filter_records))
}

/// GET /records
pub async fn list_records(Target(table): Target) -> Result<Json<Envelope<Vec<Row>>>> {
    let rows = table.select_all().await?;
    Ok(Json(Envelope::data(rows)))
}

/// GET /records/filter?col=val&...
///
/// 查询参数按出现顺序成为过滤条件，值都是字符串，由表结构负责转换类型
pub async fn filter_records(
    Target(table): Target,
    query: std::result::Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<Envelope<Vec<Row>>>> {
    let Query(pairs) = query?;
    if pairs.is_empty() {
        return Err(ApiError::BadRequest("At least one filter required".to_string()));
    }
    let filters: Record = pairs.into_iter().collect();
    let rows = table.select(&filters).await?;
    Ok(Json(Envelope::data(rows)))
}

/// POST /records
pub async fn create_record(
    Target(table): Target,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<Json<Envelope<Row>>> {
    let Json(body) = body?;
    let data = Record::from_json_value(&body)?;
    let row = table.insert(&data).await?;
    Ok(Json(Envelope::data(row)))
}

/// PUT /records  `{ data, filters }`
pub async fn update_records(
    Target(table): Target,
    body: std::result::Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<Envelope<Vec<Row>>>> {
    let Json(request) = body?;
    let data = Record::from_json_value(&request.data)?;
    let filters = Record::from_json_value(&request.filters)?;
    let result = table.update(&data, &filters).await?;
    Ok(Json(Envelope::mutation(result.rows, result.rows_affected)))
}

/// DELETE /records  `{ filters }`
pub async fn delete_records(
    Target(table): Target,
    body: std::result::Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Json<Envelope<Vec<Row>>>> {
    let Json(request) = body?;
    let filters = Record::from_json_value(&request.filters)?;
    let result = table.delete(&filters).await?;
    Ok(Json(Envelope::mutation(result.rows, result.rows_affected)))
}

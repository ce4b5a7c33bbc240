use axum::Json;
use serde_json::{json, Value};

/// 健康检查，不访问数据库
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

//! 网关错误与响应信封

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tablegate::TableGateError;

/// 网关错误
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] TableGateError),

    #[error("Unknown table '{0}'")]
    UnknownTable(String),

    /// 请求体或查询字符串无法解析
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Core(TableGateError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Core(TableGateError::NotFound) => StatusCode::NOT_FOUND,
            ApiError::Core(TableGateError::TableNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::UnknownTable(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::Core(e) => e.client_message(),
            other => other.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// 统一响应体
///
/// 成功：`{ data, error: null }`；UPDATE / DELETE 额外带 `rowsAffected`。
/// 失败：`{ data: null, error: "..." }`，不带 `rowsAffected`。
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub data: Option<T>,
    #[serde(rename = "rowsAffected", skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    pub fn data(data: T) -> Self {
        Self {
            data: Some(data),
            rows_affected: None,
            error: None,
        }
    }

    pub fn mutation(data: T, rows_affected: u64) -> Self {
        Self {
            data: Some(data),
            rows_affected: Some(rows_affected),
            error: None,
        }
    }
}

impl Envelope<()> {
    pub fn failure(message: String) -> Self {
        Self {
            data: None,
            rows_affected: None,
            error: Some(message),
        }
    }
}

/// 标记响应由 [`ApiError`] 生成，信封模式下状态码会被改写为 200
#[derive(Debug, Clone, Copy)]
pub struct ApiFailure;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {:?}", self);
        } else {
            tracing::debug!("request rejected: {}", self);
        }

        let mut response = (status, Json(Envelope::failure(self.message()))).into_response();
        response.extensions_mut().insert(ApiFailure);
        response
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

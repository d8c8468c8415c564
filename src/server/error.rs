// API 错误响应
//
// 上传核心的错误在这里转换为统一的 JSON 信封 `{ code, message }`，
// code 与 HTTP 状态码一致

use super::handlers::ApiResponse;
use crate::uploader::UploadError;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};

/// API 错误
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    /// 405 时返回的 Allow 头
    allow: Vec<Method>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            allow: Vec::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        let status = err.status();
        if status.is_server_error() {
            error!("上传处理失败: {}", err);
        } else {
            warn!("上传请求被拒绝 ({}): {}", status.as_u16(), err);
        }

        let allow = match &err {
            UploadError::MethodNotAllowed { allowed, .. } => allowed.clone(),
            _ => Vec::new(),
        };

        Self {
            status,
            message: err.to_string(),
            allow,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        if !self.allow.is_empty() {
            let allow = self
                .allow
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                headers.insert(header::ALLOW, value);
            }
        }

        let body = ApiResponse::<()>::error(self.status.as_u16() as i32, self.message);
        (self.status, headers, Json(body)).into_response()
    }
}

/// API 结果
pub type ApiResult<T> = std::result::Result<T, ApiError>;

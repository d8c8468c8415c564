// 上传错误类型

use crate::storage::StorageError;
use axum::http::{Method, StatusCode};
use thiserror::Error;

/// 分片范围校验错误（均在写入前拒绝）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("分片索引越界: index={index}, total={total}")]
    IndexOutOfRange { index: u64, total: u64 },

    #[error("分片总数必须至少为 1")]
    EmptyUpload,

    #[error("分片大小必须大于 0")]
    InvalidChunkSize,

    #[error("声明的文件大小 {total_size} 与分片大小 {chunk_size} x 分片数 {total_chunks} 不一致")]
    InconsistentSize {
        chunk_size: u64,
        total_chunks: u64,
        total_size: u64,
    },

    #[error("分片偏移不一致: 期望 {expected}, 实际 {actual}")]
    OffsetMismatch { expected: u64, actual: u64 },

    #[error("分片内容长度不一致: 期望 {expected} bytes, 实际 {actual} bytes")]
    PayloadSizeMismatch { expected: u64, actual: u64 },
}

/// 上传处理错误
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("不支持的请求方法 {method}，仅允许: {}", format_methods(.allowed))]
    MethodNotAllowed { method: Method, allowed: Vec<Method> },

    #[error("{0}")]
    BadRequest(String),

    #[error("上传文件损坏: {0}")]
    UploadIo(String),

    #[error("缺少必填字段: {0}")]
    MissingField(String),

    #[error("字段 {field} 的值无效: {value:?}")]
    InvalidField { field: String, value: String },

    #[error("非法的上传 ID: {0:?}")]
    InvalidUploadId(String),

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error(
        "上传 {upload_id} 的元数据与首个分片不一致: 分片数 {expected_chunks} -> {actual_chunks}, 文件大小 {expected_size} -> {actual_size}, 分片大小 {expected_chunk_size} -> {actual_chunk_size}"
    )]
    InconsistentUpload {
        upload_id: String,
        expected_chunks: u64,
        actual_chunks: u64,
        expected_size: u64,
        actual_size: u64,
        expected_chunk_size: u64,
        actual_chunk_size: u64,
    },

    #[error("文件不存在: {0}")]
    NotFound(String),

    #[error("文件已存在: {0}")]
    AlreadyExists(String),

    #[error("分片写入失败: {0}")]
    StorageWrite(#[source] StorageError),

    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),

    #[error("上传 {upload_id} 合并时缺少分片 #{missing_index}")]
    IncompleteMerge { upload_id: String, missing_index: u64 },

    #[error("合并后文件大小不一致: 期望 {expected} bytes, 实际 {actual} bytes")]
    MergeSizeMismatch { expected: u64, actual: u64 },
}

fn format_methods(methods: &[Method]) -> String {
    methods
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl UploadError {
    /// 仅允许 POST
    pub fn post_only(method: Method) -> Self {
        Self::MethodNotAllowed {
            method,
            allowed: vec![Method::POST],
        }
    }

    /// 对应的 HTTP 状态码
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::BadRequest(_)
            | Self::MissingField(_)
            | Self::InvalidField { .. }
            | Self::InvalidUploadId(_)
            | Self::Range(_)
            | Self::InconsistentUpload { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::IncompleteMerge { .. } => StatusCode::ACCEPTED,
            Self::UploadIo(_)
            | Self::StorageWrite(_)
            | Self::Storage(_)
            | Self::MergeSizeMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 是否为客户端错误（4xx）
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

/// 上传结果
pub type UploadResult<T> = std::result::Result<T, UploadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_not_allowed_names_post() {
        let err = UploadError::post_only(Method::GET);
        assert_eq!(err.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(err.to_string().contains("POST"));
        assert!(err.to_string().contains("GET"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            UploadError::MissingField("dzuuid".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            UploadError::Range(RangeError::EmptyUpload).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            UploadError::NotFound("a.txt".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            UploadError::StorageWrite(StorageError::InvalidKey("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert!(!UploadError::UploadIo("truncated".into()).is_client_error());
        assert!(UploadError::InvalidUploadId("../x".into()).is_client_error());
    }
}

// 客户端分片协议适配
//
// 不同的前端分片库用不同的字段名传递同样的四个逻辑值
// （分片索引、分片大小、文件总大小、分片总数）+ 上传 ID，
// 适配器只负责把字段还原为 UploadDescriptor

use super::descriptor::{parse_u64, sanitize_upload_id, LastChunk, UploadDescriptor};
use super::error::{UploadError, UploadResult};
use super::request::UploadRequest;

/// 分片协议
pub trait ChunkProtocol: Send + Sync + 'static {
    /// 协议名称（用于日志）
    fn name(&self) -> &'static str;

    /// 决定是否走分片流程的四个字段
    fn chunk_fields(&self) -> [&'static str; 4];

    /// 四个分片字段一个都没有时视为整文件上传
    fn is_monolith(&self, request: &UploadRequest) -> bool {
        self.chunk_fields()
            .iter()
            .all(|field| request.field(field).is_none())
    }

    /// 提取分片描述符（分片流程下所有字段均为必填）
    fn extract(&self, request: &UploadRequest) -> UploadResult<UploadDescriptor>;
}

fn required<'a>(request: &'a UploadRequest, field: &str) -> UploadResult<&'a str> {
    request
        .field(field)
        .ok_or_else(|| UploadError::MissingField(field.to_string()))
}

fn required_u64(request: &UploadRequest, field: &str) -> UploadResult<u64> {
    parse_u64(field, required(request, field)?)
}

/// Dropzone 协议
///
/// 字段：dzuuid / dzchunkindex / dztotalfilesize / dzchunksize /
/// dztotalchunkcount / dzchunkbyteoffset（可选）
#[derive(Debug, Clone, Copy, Default)]
pub struct DropzoneProtocol;

impl DropzoneProtocol {
    const UUID: &'static str = "dzuuid";
    const CHUNK_INDEX: &'static str = "dzchunkindex";
    const TOTAL_FILE_SIZE: &'static str = "dztotalfilesize";
    const CHUNK_SIZE: &'static str = "dzchunksize";
    const TOTAL_CHUNK_COUNT: &'static str = "dztotalchunkcount";
    const BYTE_OFFSET: &'static str = "dzchunkbyteoffset";
}

impl ChunkProtocol for DropzoneProtocol {
    fn name(&self) -> &'static str {
        "dropzone"
    }

    fn chunk_fields(&self) -> [&'static str; 4] {
        [
            Self::CHUNK_INDEX,
            Self::CHUNK_SIZE,
            Self::TOTAL_FILE_SIZE,
            Self::TOTAL_CHUNK_COUNT,
        ]
    }

    fn extract(&self, request: &UploadRequest) -> UploadResult<UploadDescriptor> {
        let upload_id = sanitize_upload_id(required(request, Self::UUID)?)?;
        let chunk_index = required_u64(request, Self::CHUNK_INDEX)?;
        let total_file_size = required_u64(request, Self::TOTAL_FILE_SIZE)?;
        let chunk_size = required_u64(request, Self::CHUNK_SIZE)?;
        let total_chunk_count = required_u64(request, Self::TOTAL_CHUNK_COUNT)?;
        let byte_offset = request
            .field(Self::BYTE_OFFSET)
            .map(|v| parse_u64(Self::BYTE_OFFSET, v))
            .transpose()?;

        Ok(UploadDescriptor {
            upload_id,
            chunk_index,
            total_chunk_count,
            chunk_size,
            total_file_size,
            byte_offset,
            last_chunk: LastChunk::Shorter,
        })
    }
}

/// resumable.js 协议
///
/// resumableChunkNumber 从 1 开始；余数并入最后一个分片
#[derive(Debug, Clone, Copy, Default)]
pub struct ResumableProtocol;

impl ResumableProtocol {
    const IDENTIFIER: &'static str = "resumableIdentifier";
    const CHUNK_NUMBER: &'static str = "resumableChunkNumber";
    const TOTAL_SIZE: &'static str = "resumableTotalSize";
    const CHUNK_SIZE: &'static str = "resumableChunkSize";
    const TOTAL_CHUNKS: &'static str = "resumableTotalChunks";
}

impl ChunkProtocol for ResumableProtocol {
    fn name(&self) -> &'static str {
        "resumable"
    }

    fn chunk_fields(&self) -> [&'static str; 4] {
        [
            Self::CHUNK_NUMBER,
            Self::CHUNK_SIZE,
            Self::TOTAL_SIZE,
            Self::TOTAL_CHUNKS,
        ]
    }

    fn extract(&self, request: &UploadRequest) -> UploadResult<UploadDescriptor> {
        let upload_id = sanitize_upload_id(required(request, Self::IDENTIFIER)?)?;

        let raw_number = required(request, Self::CHUNK_NUMBER)?;
        let chunk_number = parse_u64(Self::CHUNK_NUMBER, raw_number)?;
        let chunk_index = chunk_number
            .checked_sub(1)
            .ok_or_else(|| UploadError::InvalidField {
                field: Self::CHUNK_NUMBER.to_string(),
                value: raw_number.to_string(),
            })?;

        Ok(UploadDescriptor {
            upload_id,
            chunk_index,
            total_chunk_count: required_u64(request, Self::TOTAL_CHUNKS)?,
            chunk_size: required_u64(request, Self::CHUNK_SIZE)?,
            total_file_size: required_u64(request, Self::TOTAL_SIZE)?,
            byte_offset: None,
            last_chunk: LastChunk::Absorbing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn dropzone_request() -> UploadRequest {
        UploadRequest::new(Method::POST)
            .with_field("dzuuid", "2a3b-4c5d")
            .with_field("dzchunkindex", 2)
            .with_field("dztotalfilesize", 250)
            .with_field("dzchunksize", 100)
            .with_field("dztotalchunkcount", 3)
            .with_field("dzchunkbyteoffset", 200)
    }

    #[test]
    fn test_dropzone_monolith_without_chunk_fields() {
        let request = UploadRequest::new(Method::POST).with_field("dzuuid", "abc");
        assert!(DropzoneProtocol.is_monolith(&request));
        assert!(!DropzoneProtocol.is_monolith(&dropzone_request()));
    }

    #[test]
    fn test_dropzone_any_field_forces_chunked() {
        let request = UploadRequest::new(Method::POST).with_field("dzchunksize", 100);
        assert!(!DropzoneProtocol.is_monolith(&request));

        // 分片流程下缺失字段是客户端错误，不会被默认填充
        match DropzoneProtocol.extract(&request) {
            Err(UploadError::MissingField(field)) => assert_eq!(field, "dzuuid"),
            other => panic!("unexpected: {:?}", other),
        }

        let request = request.with_field("dzuuid", "abc");
        match DropzoneProtocol.extract(&request) {
            Err(UploadError::MissingField(field)) => assert_eq!(field, "dzchunkindex"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_dropzone_extract() {
        let descriptor = DropzoneProtocol.extract(&dropzone_request()).unwrap();
        assert_eq!(
            descriptor,
            UploadDescriptor {
                upload_id: "2a3b-4c5d".to_string(),
                chunk_index: 2,
                total_chunk_count: 3,
                chunk_size: 100,
                total_file_size: 250,
                byte_offset: Some(200),
                last_chunk: LastChunk::Shorter,
            }
        );
    }

    #[test]
    fn test_dropzone_rejects_bad_values() {
        let request = dropzone_request().with_field("dzchunkindex", "x");
        assert!(matches!(
            DropzoneProtocol.extract(&request),
            Err(UploadError::InvalidField { .. })
        ));

        let request = dropzone_request().with_field("dzuuid", "../../etc");
        assert!(matches!(
            DropzoneProtocol.extract(&request),
            Err(UploadError::InvalidUploadId(_))
        ));
    }

    #[test]
    fn test_resumable_extract_converts_one_based_index() {
        let request = UploadRequest::new(Method::POST)
            .with_field("resumableIdentifier", "1048576-moviemp4")
            .with_field("resumableChunkNumber", 1)
            .with_field("resumableChunkSize", 1024)
            .with_field("resumableTotalSize", 2500)
            .with_field("resumableTotalChunks", 2);

        let descriptor = ResumableProtocol.extract(&request).unwrap();
        assert_eq!(descriptor.chunk_index, 0);
        assert_eq!(descriptor.total_chunk_count, 2);
        assert_eq!(descriptor.last_chunk, LastChunk::Absorbing);

        let request = request.with_field("resumableChunkNumber", 0);
        assert!(matches!(
            ResumableProtocol.extract(&request),
            Err(UploadError::InvalidField { .. })
        ));
    }
}

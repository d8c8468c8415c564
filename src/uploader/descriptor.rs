// 分片描述符
//
// 各客户端协议的字段名不同，统一在这里还原为同一个结构，
// 之后的校验、存储、合并只依赖 UploadDescriptor

use super::error::{UploadError, UploadResult};

/// 上传 ID 最大长度
pub const MAX_UPLOAD_ID_LEN: usize = 128;

/// 最后一个分片的大小规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LastChunk {
    /// 最后一个分片较小（Dropzone 等）
    #[default]
    Shorter,
    /// 余数并入最后一个分片，最后一片可达两倍分片大小（resumable.js）
    Absorbing,
}

/// 单个分片请求的描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadDescriptor {
    /// 已清洗的上传 ID
    pub upload_id: String,
    /// 分片索引（从 0 开始）
    pub chunk_index: u64,
    /// 分片总数
    pub total_chunk_count: u64,
    /// 声明的分片大小
    pub chunk_size: u64,
    /// 声明的文件总大小
    pub total_file_size: u64,
    /// 声明的字节偏移（可选，用于交叉校验）
    pub byte_offset: Option<u64>,
    /// 最后一片的规则
    pub last_chunk: LastChunk,
}

/// 清洗客户端提供的上传 ID
///
/// 上传 ID 会直接作为存储路径的一段，只允许 `[A-Za-z0-9._-]`，
/// 且不能以 `.` 开头
pub fn sanitize_upload_id(raw: &str) -> UploadResult<String> {
    let id = raw.trim();
    let valid = !id.is_empty()
        && id.len() <= MAX_UPLOAD_ID_LEN
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if !valid {
        return Err(UploadError::InvalidUploadId(raw.to_string()));
    }
    Ok(id.to_string())
}

/// 解析无符号整数字段
pub(crate) fn parse_u64(field: &str, value: &str) -> UploadResult<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| UploadError::InvalidField {
            field: field.to_string(),
            value: value.to_string(),
        })
}

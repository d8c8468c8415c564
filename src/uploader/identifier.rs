// 整文件上传的文件名生成

use super::request::{file_extension, FileMetadata};
use crate::config::IdentifierKind;
use rand::Rng;
use sha1::{Digest, Sha1};
use std::sync::Arc;

/// 文件名生成器
pub trait Identifier: Send + Sync {
    /// 为上传文件生成存储文件名
    fn generate(&self, metadata: &FileMetadata) -> String;
}

fn with_extension(stem: String, metadata: &FileMetadata) -> String {
    match file_extension(&metadata.original_name) {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

/// SHA-1 摘要文件名（默认）
///
/// 摘要输入包含到达时间与随机数，同名同大小的文件也不会冲突
#[derive(Debug, Clone, Copy, Default)]
pub struct HashIdentifier;

impl Identifier for HashIdentifier {
    fn generate(&self, metadata: &FileMetadata) -> String {
        let nanos = metadata
            .received_at
            .timestamp_nanos_opt()
            .unwrap_or_else(|| metadata.received_at.timestamp_micros());
        let salt: u64 = rand::thread_rng().gen();

        let mut hasher = Sha1::new();
        hasher.update(metadata.original_name.as_bytes());
        hasher.update(b"|");
        hasher.update(metadata.size.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(nanos.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(salt.to_be_bytes());

        with_extension(hex::encode(hasher.finalize()), metadata)
    }
}

/// UUID v4 文件名
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdentifier;

impl Identifier for UuidIdentifier {
    fn generate(&self, metadata: &FileMetadata) -> String {
        with_extension(uuid::Uuid::new_v4().to_string(), metadata)
    }
}

/// 保留原始文件名（清洗后）
#[derive(Debug, Clone, Copy, Default)]
pub struct OriginalNameIdentifier;

impl Identifier for OriginalNameIdentifier {
    fn generate(&self, metadata: &FileMetadata) -> String {
        sanitize_file_name(&metadata.original_name)
    }
}

/// 清洗文件名：去掉目录部分，非 `[A-Za-z0-9._-]` 字符替换为 `_`
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// 根据配置创建生成器
pub fn from_kind(kind: IdentifierKind) -> Arc<dyn Identifier> {
    match kind {
        IdentifierKind::Hash => Arc::new(HashIdentifier),
        IdentifierKind::Uuid => Arc::new(UuidIdentifier),
        IdentifierKind::Original => Arc::new(OriginalNameIdentifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn metadata(name: &str) -> FileMetadata {
        FileMetadata {
            original_name: name.to_string(),
            size: 20,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_hash_identifier() {
        let meta = metadata("report.pdf");
        let a = HashIdentifier.generate(&meta);
        let b = HashIdentifier.generate(&meta);

        assert!(a.ends_with(".pdf"));
        assert_eq!(a.len(), 40 + ".pdf".len());
        assert!(a[..40].chars().all(|c| c.is_ascii_hexdigit()));
        // 相同元数据也得到不同文件名
        assert_ne!(a, b);

        let no_ext = HashIdentifier.generate(&metadata("README"));
        assert_eq!(no_ext.len(), 40);
    }

    #[test]
    fn test_uuid_identifier() {
        let name = UuidIdentifier.generate(&metadata("photo.jpeg"));
        let (stem, ext) = name.rsplit_once('.').unwrap();
        assert_eq!(ext, "jpeg");
        assert!(uuid::Uuid::parse_str(stem).is_ok());
    }

    #[test]
    fn test_original_name_is_sanitized() {
        assert_eq!(OriginalNameIdentifier.generate(&metadata("report.pdf")), "report.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\my file.txt"), "my_file.txt");
        assert_eq!(sanitize_file_name(".."), "file");
        assert_eq!(sanitize_file_name(".env"), "env");
    }

    #[test]
    fn test_from_kind() {
        let name = from_kind(IdentifierKind::Original).generate(&metadata("a.txt"));
        assert_eq!(name, "a.txt");
    }
}

// 上传请求与响应模型
//
// 与具体 Web 框架解耦：HTTP 层负责把 multipart / query 转换为 UploadRequest

use axum::http::Method;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// 扩展名最大长度
const MAX_EXTENSION_LEN: usize = 16;

/// 请求中的文件部分
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// 客户端提供的原始文件名
    pub original_name: String,
    /// 文件内容
    pub data: Bytes,
    /// 传输层报告的错误（读取中断等）
    pub error: Option<String>,
    /// 到达时间
    pub received_at: DateTime<Utc>,
}

impl UploadedFile {
    pub fn new(original_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            original_name: original_name.into(),
            data: data.into(),
            error: None,
            received_at: Utc::now(),
        }
    }

    /// 传输层读取失败的文件
    pub fn failed(original_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            original_name: original_name.into(),
            data: Bytes::new(),
            error: Some(error.into()),
            received_at: Utc::now(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// 清洗后的扩展名（仅字母数字，不含点）
    pub fn extension(&self) -> Option<String> {
        file_extension(&self.original_name)
    }

    /// 标识生成器所需的元数据
    pub fn metadata(&self) -> FileMetadata {
        FileMetadata {
            original_name: self.original_name.clone(),
            size: self.size(),
            received_at: self.received_at,
        }
    }
}

/// 提取并清洗扩展名
pub fn file_extension(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty()
        || ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_string())
}

/// 文件元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub original_name: String,
    pub size: u64,
    pub received_at: DateTime<Utc>,
}

/// 一次上传请求
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// HTTP 方法
    pub method: Method,
    /// 表单字段（POST）或查询参数（其他方法）
    pub fields: HashMap<String, String>,
    /// 文件部分（字段名 -> 文件）
    pub files: HashMap<String, UploadedFile>,
}

impl UploadRequest {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            fields: HashMap::new(),
            files: HashMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.fields.insert(name.into(), value.to_string());
        self
    }

    pub fn with_file(mut self, param: impl Into<String>, file: UploadedFile) -> Self {
        self.files.insert(param.into(), file);
        self
    }

    /// 获取非空字段值
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn file(&self, param: &str) -> Option<&UploadedFile> {
        self.files.get(param)
    }
}

/// 合并（或整文件保存）后的成品
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedFile {
    /// 磁盘名称
    pub disk: String,
    /// 磁盘内路径
    pub path: String,
    /// 文件大小
    pub size: u64,
}

/// 上传进度
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadProgress {
    /// 完成百分比 (0-100)
    pub percentage: u8,
    /// 是否已全部完成
    pub finished: bool,
    /// 完成后的文件名（位于合并目录下）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_file: Option<String>,
}

impl UploadProgress {
    pub fn partial(percentage: u8) -> Self {
        Self {
            percentage,
            finished: false,
            merged_file: None,
        }
    }

    pub fn finished(merged_file: impl Into<String>) -> Self {
        Self {
            percentage: 100,
            finished: true,
            merged_file: Some(merged_file.into()),
        }
    }
}

/// 下载目标
#[derive(Debug, Clone)]
pub struct DownloadFile {
    /// 附件文件名
    pub filename: String,
    /// 磁盘内路径
    pub path: String,
    /// 本地绝对路径（本地磁盘可流式发送）
    pub absolute_path: Option<PathBuf>,
    pub size: u64,
}

/// 驱动处理结果
#[derive(Debug, Clone)]
pub enum UploadResponse {
    /// 上传进度（分片或整文件）
    Progress(UploadProgress),
    /// 文件下载
    Download(DownloadFile),
    /// 文件已删除
    Deleted { filename: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("test.txt"), Some("txt".to_string()));
        assert_eq!(file_extension("archive.tar.gz"), Some("gz".to_string()));
        assert_eq!(file_extension("dir/photo.JPG"), Some("JPG".to_string()));
        assert_eq!(file_extension("noext"), None);
        assert_eq!(file_extension(".bashrc"), None);
        assert_eq!(file_extension("trailing."), None);
        assert_eq!(file_extension("bad.ex/t"), None);
        assert_eq!(file_extension("evil.p h p"), None);
    }

    #[test]
    fn test_field_ignores_empty_values() {
        let request = UploadRequest::new(Method::POST)
            .with_field("dzuuid", "")
            .with_field("dzchunkindex", 3);
        assert_eq!(request.field("dzuuid"), None);
        assert_eq!(request.field("dzchunkindex"), Some("3"));
        assert_eq!(request.field("missing"), None);
    }

    #[test]
    fn test_uploaded_file_validity() {
        let ok = UploadedFile::new("a.txt", Bytes::from_static(b"abc"));
        assert!(ok.error.is_none());
        assert_eq!(ok.size(), 3);
        assert_eq!(ok.metadata().original_name, "a.txt");

        let failed = UploadedFile::failed("a.txt", "connection reset");
        assert_eq!(failed.error.as_deref(), Some("connection reset"));
        assert_eq!(failed.size(), 0);
    }
}

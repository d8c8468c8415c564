//! 存储后端抽象
//!
//! 上传核心只通过 [`Disk`] 访问存储，所有并发协调都依赖存储层的原子语义：
//! - `write` / `open_writer().commit()`：先写临时键，再原子重命名
//! - `put_if_absent`：仅在目标不存在时写入，用于清单与完成标记
//! - `delete_directory`：目录不存在时视为成功

pub mod local;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub use local::LocalDisk;
pub use memory::MemoryDisk;

use crate::config::DiskConfig;

/// 存储操作错误
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("对象不存在: {0}")]
    NotFound(String),

    #[error("对象已存在: {0}")]
    AlreadyExists(String),

    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("非法存储键: {0}")]
    InvalidKey(String),

    #[error("序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("未配置的磁盘: {0}")]
    UnknownDisk(String),
}

/// 存储操作结果
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// 存储能力接口
#[async_trait]
pub trait Disk: Send + Sync + 'static {
    /// 原子写入（覆盖已有内容）
    async fn write(&self, path: &str, data: Bytes) -> StorageResult<()>;

    /// 仅当对象不存在时写入，返回是否由本次调用创建
    async fn put_if_absent(&self, path: &str, data: Bytes) -> StorageResult<bool>;

    /// 读取对象内容
    async fn read(&self, path: &str) -> StorageResult<Bytes>;

    /// 对象是否存在
    async fn exists(&self, path: &str) -> StorageResult<bool>;

    /// 列出目录下的直接文件名（不含子目录，目录不存在时返回空）
    async fn list(&self, dir: &str) -> StorageResult<Vec<String>>;

    /// 删除单个对象
    async fn delete(&self, path: &str) -> StorageResult<()>;

    /// 递归删除目录，目录不存在时为 no-op
    async fn delete_directory(&self, path: &str) -> StorageResult<()>;

    /// 打开流式写入器，`commit` 后才对读者可见
    async fn open_writer(&self, path: &str) -> StorageResult<Box<dyn DiskWriter>>;

    /// 对象大小（字节）
    async fn size(&self, path: &str) -> StorageResult<u64>;

    /// 本地绝对路径（非本地后端返回 None）
    fn absolute_path(&self, path: &str) -> Option<PathBuf>;

    /// 后端名称（用于日志）
    fn backend_name(&self) -> &'static str;
}

/// 流式写入器
#[async_trait]
pub trait DiskWriter: Send {
    /// 追加一段数据
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// 完成写入并原子替换目标，返回写入的总字节数
    async fn commit(self: Box<Self>) -> StorageResult<u64>;

    /// 放弃写入，清理临时数据
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}

/// 校验并拆分存储键
///
/// 键为 `/` 分隔的相对路径，拒绝空段、`.`、`..` 以及绝对路径
pub(crate) fn key_segments(key: &str) -> StorageResult<Vec<&str>> {
    if key.is_empty() || key.starts_with('/') || key.contains('\\') || key.contains('\0') {
        return Err(StorageError::InvalidKey(key.to_string()));
    }

    let segments: Vec<&str> = key.split('/').collect();
    if segments
        .iter()
        .any(|s| s.is_empty() || *s == "." || *s == "..")
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }

    Ok(segments)
}

/// 拼接存储键
pub fn join_key(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// 磁盘管理器
///
/// 按配置中的名称解析磁盘实例
#[derive(Clone, Default)]
pub struct DiskManager {
    disks: HashMap<String, Arc<dyn Disk>>,
}

impl DiskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 根据配置创建全部磁盘
    pub async fn from_config(configs: &HashMap<String, DiskConfig>) -> StorageResult<Self> {
        let mut manager = Self::new();
        for (name, config) in configs {
            let disk: Arc<dyn Disk> = match config {
                DiskConfig::Local { root } => Arc::new(LocalDisk::new(root).await?),
                DiskConfig::Memory => Arc::new(MemoryDisk::new()),
            };
            tracing::info!("已注册磁盘: {} ({})", name, disk.backend_name());
            manager.insert(name.clone(), disk);
        }
        Ok(manager)
    }

    /// 注册磁盘
    pub fn insert(&mut self, name: impl Into<String>, disk: Arc<dyn Disk>) {
        self.disks.insert(name.into(), disk);
    }

    /// 获取磁盘
    pub fn disk(&self, name: &str) -> StorageResult<Arc<dyn Disk>> {
        self.disks
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::UnknownDisk(name.to_string()))
    }
}

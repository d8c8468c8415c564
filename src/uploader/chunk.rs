// 分片存储
//
// 分片布局（均位于 chunk_directory 下）：
// - {upload_id}/{index}        分片内容，文件名为十进制索引
// - {upload_id}/upload.json    首个分片写入的上传清单
// - .completed/{upload_id}     完成标记，清理分片目录后仍保留

use super::descriptor::UploadDescriptor;
use super::error::{UploadError, UploadResult};
use crate::storage::{join_key, Disk, StorageError, StorageResult};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// 清单文件名
pub const MANIFEST_FILE: &str = "upload.json";

/// 完成标记目录
pub const COMPLETED_DIR: &str = ".completed";

/// 上传清单
///
/// 由同一上传 ID 的首个合法分片创建，后续分片必须与之一致
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadManifest {
    pub total_chunk_count: u64,
    pub total_file_size: u64,
    pub chunk_size: u64,
    pub created_at: DateTime<Utc>,
}

impl UploadManifest {
    pub fn from_descriptor(descriptor: &UploadDescriptor) -> Self {
        Self {
            total_chunk_count: descriptor.total_chunk_count,
            total_file_size: descriptor.total_file_size,
            chunk_size: descriptor.chunk_size,
            created_at: Utc::now(),
        }
    }

    /// 检查分片声明是否与清单一致
    ///
    /// 分片大小也必须一致，否则各分片的字节区间会重叠或留下空洞
    pub fn check(&self, descriptor: &UploadDescriptor) -> UploadResult<()> {
        if self.total_chunk_count != descriptor.total_chunk_count
            || self.total_file_size != descriptor.total_file_size
            || self.chunk_size != descriptor.chunk_size
        {
            return Err(UploadError::InconsistentUpload {
                upload_id: descriptor.upload_id.clone(),
                expected_chunks: self.total_chunk_count,
                actual_chunks: descriptor.total_chunk_count,
                expected_size: self.total_file_size,
                actual_size: descriptor.total_file_size,
                expected_chunk_size: self.chunk_size,
                actual_chunk_size: descriptor.chunk_size,
            });
        }
        Ok(())
    }
}

/// 完成标记内容
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CompletionRecord {
    path: String,
    size: u64,
    completed_at: DateTime<Utc>,
}

/// 分片存储
pub struct ChunkStore<'a> {
    disk: &'a dyn Disk,
    chunk_directory: &'a str,
}

impl<'a> ChunkStore<'a> {
    pub fn new(disk: &'a dyn Disk, chunk_directory: &'a str) -> Self {
        Self {
            disk,
            chunk_directory,
        }
    }

    /// 单个上传的分片目录
    pub fn upload_dir(&self, upload_id: &str) -> String {
        join_key(self.chunk_directory, upload_id)
    }

    pub fn chunk_key(&self, upload_id: &str, chunk_index: u64) -> String {
        join_key(&self.upload_dir(upload_id), &chunk_index.to_string())
    }

    fn manifest_key(&self, upload_id: &str) -> String {
        join_key(&self.upload_dir(upload_id), MANIFEST_FILE)
    }

    fn completion_key(&self, upload_id: &str) -> String {
        join_key(&join_key(self.chunk_directory, COMPLETED_DIR), upload_id)
    }

    /// 写入分片（同一索引重复写入会覆盖）
    pub async fn put(&self, upload_id: &str, chunk_index: u64, data: Bytes) -> UploadResult<()> {
        let key = self.chunk_key(upload_id, chunk_index);
        let len = data.len();
        self.disk
            .write(&key, data)
            .await
            .map_err(UploadError::StorageWrite)?;
        debug!("分片已写入: {} ({} bytes)", key, len);
        Ok(())
    }

    /// 读取分片
    pub async fn read(&self, upload_id: &str, chunk_index: u64) -> StorageResult<Bytes> {
        self.disk.read(&self.chunk_key(upload_id, chunk_index)).await
    }

    /// 已到达的分片索引
    ///
    /// 只识别十进制索引文件名，清单与临时文件被忽略
    pub async fn list(&self, upload_id: &str) -> UploadResult<BTreeSet<u64>> {
        let names = self.disk.list(&self.upload_dir(upload_id)).await?;
        Ok(names
            .iter()
            .filter_map(|name| {
                let index = name.parse::<u64>().ok()?;
                (index.to_string() == *name).then_some(index)
            })
            .collect())
    }

    /// 该上传是否已有清单（即已接受过分片）
    pub async fn has_manifest(&self, upload_id: &str) -> UploadResult<bool> {
        Ok(self.disk.exists(&self.manifest_key(upload_id)).await?)
    }

    /// 记录上传清单，返回实际生效的清单
    ///
    /// 并发的首个分片只有一个能写入，其余请求读取已存在的清单
    pub async fn record_manifest(
        &self,
        upload_id: &str,
        manifest: &UploadManifest,
    ) -> UploadResult<UploadManifest> {
        let key = self.manifest_key(upload_id);
        let data = Bytes::from(serde_json::to_vec(manifest).map_err(StorageError::from)?);

        // 读取已有清单时目录可能刚被清理，重新写入一次
        let mut retried = false;
        loop {
            if self
                .disk
                .put_if_absent(&key, data.clone())
                .await
                .map_err(UploadError::StorageWrite)?
            {
                debug!("上传清单已创建: {}", key);
                return Ok(manifest.clone());
            }

            match self.disk.read(&key).await {
                Ok(stored) => {
                    let stored: UploadManifest =
                        serde_json::from_slice(&stored).map_err(StorageError::from)?;
                    return Ok(stored);
                }
                Err(StorageError::NotFound(_)) if !retried => retried = true,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// 上传是否已完成（完成标记存在）
    pub async fn is_completed(&self, upload_id: &str) -> UploadResult<bool> {
        Ok(self.disk.exists(&self.completion_key(upload_id)).await?)
    }

    /// 抢占完成标记，返回是否由本次调用创建
    ///
    /// 只有抢占成功的请求负责清理与通知
    pub async fn claim_completion(&self, upload_id: &str, path: &str, size: u64) -> UploadResult<bool> {
        let record = CompletionRecord {
            path: path.to_string(),
            size,
            completed_at: Utc::now(),
        };
        let data = Bytes::from(serde_json::to_vec(&record).map_err(StorageError::from)?);
        let claimed = self
            .disk
            .put_if_absent(&self.completion_key(upload_id), data)
            .await
            .map_err(UploadError::StorageWrite)?;
        Ok(claimed)
    }
}

// 内存磁盘
//
// 进程内的键值实现，语义与本地磁盘保持一致，主要用于测试

use super::{key_segments, Disk, DiskWriter, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

type Objects = Arc<RwLock<BTreeMap<String, Bytes>>>;

/// 内存磁盘
#[derive(Debug, Clone, Default)]
pub struct MemoryDisk {
    objects: Objects,
}

impl MemoryDisk {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前对象数量
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// 是否为空
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// 是否存在以 `dir/` 为前缀的对象
    pub async fn has_directory(&self, dir: &str) -> bool {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.objects
            .read()
            .await
            .keys()
            .any(|k| k.starts_with(&prefix))
    }
}

#[async_trait]
impl Disk for MemoryDisk {
    async fn write(&self, path: &str, data: Bytes) -> StorageResult<()> {
        key_segments(path)?;
        self.objects.write().await.insert(path.to_string(), data);
        Ok(())
    }

    async fn put_if_absent(&self, path: &str, data: Bytes) -> StorageResult<bool> {
        key_segments(path)?;
        let mut objects = self.objects.write().await;
        if objects.contains_key(path) {
            return Ok(false);
        }
        objects.insert(path.to_string(), data);
        Ok(true)
    }

    async fn read(&self, path: &str) -> StorageResult<Bytes> {
        key_segments(path)?;
        self.objects
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        key_segments(path)?;
        Ok(self.objects.read().await.contains_key(path))
    }

    async fn list(&self, dir: &str) -> StorageResult<Vec<String>> {
        key_segments(dir)?;
        let prefix = format!("{}/", dir);
        let objects = self.objects.read().await;
        Ok(objects
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect())
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        key_segments(path)?;
        self.objects
            .write()
            .await
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn delete_directory(&self, path: &str) -> StorageResult<()> {
        key_segments(path)?;
        let prefix = format!("{}/", path);
        self.objects
            .write()
            .await
            .retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }

    async fn open_writer(&self, path: &str) -> StorageResult<Box<dyn DiskWriter>> {
        key_segments(path)?;
        Ok(Box::new(MemoryDiskWriter {
            objects: Arc::clone(&self.objects),
            target: path.to_string(),
            buffer: BytesMut::new(),
        }))
    }

    async fn size(&self, path: &str) -> StorageResult<u64> {
        Ok(self.read(path).await?.len() as u64)
    }

    fn absolute_path(&self, _path: &str) -> Option<PathBuf> {
        None
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryDiskWriter {
    objects: Objects,
    target: String,
    buffer: BytesMut,
}

#[async_trait]
impl DiskWriter for MemoryDiskWriter {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.buffer.extend_from_slice(&data);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<u64> {
        let written = self.buffer.len() as u64;
        self.objects
            .write()
            .await
            .insert(self.target, self.buffer.freeze());
        Ok(written)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}

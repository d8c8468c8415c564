// 本地文件系统磁盘
//
// 写入策略与元数据文件一致：先写同目录下的临时文件，再原子重命名，
// 读者永远看不到写了一半的对象

use super::{key_segments, Disk, DiskWriter, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

/// 本地磁盘
#[derive(Debug, Clone)]
pub struct LocalDisk {
    root: PathBuf,
}

impl LocalDisk {
    /// 创建本地磁盘，根目录不存在时自动创建
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// 根目录
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        let mut path = self.root.clone();
        for segment in key_segments(key)? {
            path.push(segment);
        }
        Ok(path)
    }

    async fn ensure_parent(path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// 在目标同目录写入临时文件
    ///
    /// 目录可能在写入前被并发清理，此时重建目录后重试一次
    async fn write_temp(target: &Path, data: &[u8]) -> StorageResult<PathBuf> {
        let mut retried = false;
        loop {
            Self::ensure_parent(target).await?;
            let temp = temp_path_for(target);
            match fs::write(&temp, data).await {
                Ok(()) => return Ok(temp),
                Err(e) if e.kind() == ErrorKind::NotFound && !retried => retried = true,
                Err(e) => {
                    let _ = fs::remove_file(&temp).await;
                    return Err(e.into());
                }
            }
        }
    }
}

/// 同目录临时文件路径（以 `.` 开头，不会被当作分片或成品）
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
}

fn map_not_found(err: std::io::Error, key: &str) -> StorageError {
    if err.kind() == ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(err)
    }
}

#[async_trait]
impl Disk for LocalDisk {
    async fn write(&self, path: &str, data: Bytes) -> StorageResult<()> {
        let target = self.resolve(path)?;
        let temp = Self::write_temp(&target, &data).await?;
        if let Err(e) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }

        debug!("已写入: {:?} ({} bytes)", target, data.len());
        Ok(())
    }

    async fn put_if_absent(&self, path: &str, data: Bytes) -> StorageResult<bool> {
        let target = self.resolve(path)?;

        // 先写完整临时文件，再用硬链接发布：目标已存在时链接失败
        let temp = Self::write_temp(&target, &data).await?;
        let result = fs::hard_link(&temp, &target).await;
        let _ = fs::remove_file(&temp).await;

        match result {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, path: &str) -> StorageResult<Bytes> {
        let target = self.resolve(path)?;
        let data = fs::read(&target)
            .await
            .map_err(|e| map_not_found(e, path))?;
        Ok(Bytes::from(data))
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let target = self.resolve(path)?;
        Ok(fs::try_exists(&target).await?)
    }

    async fn list(&self, dir: &str) -> StorageResult<Vec<String>> {
        let target = self.resolve(dir)?;
        let mut entries = match fs::read_dir(&target).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        let target = self.resolve(path)?;
        fs::remove_file(&target)
            .await
            .map_err(|e| map_not_found(e, path))
    }

    async fn delete_directory(&self, path: &str) -> StorageResult<()> {
        let target = self.resolve(path)?;
        match fs::remove_dir_all(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn open_writer(&self, path: &str) -> StorageResult<Box<dyn DiskWriter>> {
        let target = self.resolve(path)?;
        Self::ensure_parent(&target).await?;

        let temp = temp_path_for(&target);
        let file = File::create(&temp).await?;
        Ok(Box::new(LocalDiskWriter {
            writer: BufWriter::new(file),
            temp,
            target,
            written: 0,
        }))
    }

    async fn size(&self, path: &str) -> StorageResult<u64> {
        let target = self.resolve(path)?;
        let metadata = fs::metadata(&target)
            .await
            .map_err(|e| map_not_found(e, path))?;
        Ok(metadata.len())
    }

    fn absolute_path(&self, path: &str) -> Option<PathBuf> {
        self.resolve(path).ok()
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}

/// 本地流式写入器
struct LocalDiskWriter {
    writer: BufWriter<File>,
    temp: PathBuf,
    target: PathBuf,
    written: u64,
}

#[async_trait]
impl DiskWriter for LocalDiskWriter {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.writer.write_all(&data).await?;
        self.written += data.len() as u64;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<u64> {
        let LocalDiskWriter {
            mut writer,
            temp,
            target,
            written,
        } = *self;

        let result = async {
            writer.flush().await?;
            writer.get_ref().sync_all().await?;
            drop(writer);
            fs::rename(&temp, &target).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }

        debug!("已提交: {:?} ({} bytes)", target, written);
        Ok(written)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        let LocalDiskWriter { writer, temp, .. } = *self;
        drop(writer);
        match fs::remove_file(&temp).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

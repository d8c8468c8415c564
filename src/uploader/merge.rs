// 分片合并与清理

use super::chunk::ChunkStore;
use super::error::{UploadError, UploadResult};
use super::request::MergedFile;
use crate::config::StorageConfig;
use crate::storage::{join_key, Disk, StorageError};
use tracing::{debug, info, warn};

/// 按索引升序合并全部分片到 `{merged_directory}/{output_name}`
///
/// 先写临时文件再原子替换目标；任一分片缺失时放弃写入，不会留下截断文件
pub async fn merge(
    disk: &dyn Disk,
    config: &StorageConfig,
    upload_id: &str,
    total_chunk_count: u64,
    output_name: &str,
) -> UploadResult<MergedFile> {
    let store = ChunkStore::new(disk, &config.chunk_directory);
    let path = join_key(&config.merged_directory, output_name);

    let mut writer = disk.open_writer(&path).await?;
    for index in 0..total_chunk_count {
        let data = match store.read(upload_id, index).await {
            Ok(data) => data,
            Err(e) => {
                if let Err(abort_err) = writer.abort().await {
                    warn!("放弃合并写入失败: {}, 错误: {}", path, abort_err);
                }
                return Err(match e {
                    StorageError::NotFound(_) => UploadError::IncompleteMerge {
                        upload_id: upload_id.to_string(),
                        missing_index: index,
                    },
                    other => UploadError::Storage(other),
                });
            }
        };

        if let Err(e) = writer.write(data).await {
            if let Err(abort_err) = writer.abort().await {
                warn!("放弃合并写入失败: {}, 错误: {}", path, abort_err);
            }
            return Err(UploadError::StorageWrite(e));
        }
    }

    let size = writer.commit().await.map_err(UploadError::StorageWrite)?;
    info!(
        "分片合并完成: upload_id={}, 分片数={}, 输出={}, 大小={} bytes",
        upload_id, total_chunk_count, path, size
    );

    Ok(MergedFile {
        disk: config.disk.clone(),
        path,
        size,
    })
}

/// 删除上传的分片目录
///
/// 目录不存在视为成功；失败只记录日志，不影响上传结果
pub async fn sweep(disk: &dyn Disk, config: &StorageConfig, upload_id: &str) {
    let dir = ChunkStore::new(disk, &config.chunk_directory).upload_dir(upload_id);
    match disk.delete_directory(&dir).await {
        Ok(()) => debug!("分片目录已清理: {}", dir),
        Err(e) => warn!("清理分片目录失败: {}, 错误: {}", dir, e),
    }
}

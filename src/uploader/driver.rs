// 上传驱动
//
// 驱动负责一次请求的完整处理：方法分派、文件校验、分片保存、
// 完成判定、合并、清理与通知。驱动本身无状态，所有协调都经过存储层

use super::chunk::{ChunkStore, UploadManifest};
use super::descriptor::UploadDescriptor;
use super::error::{UploadError, UploadResult};
use super::identifier::{sanitize_file_name, Identifier};
use super::merge;
use super::notify::{CompletionNotifier, FileUploaded};
use super::progress;
use super::protocol::{ChunkProtocol, DropzoneProtocol, ResumableProtocol};
use super::range;
use super::request::{DownloadFile, UploadProgress, UploadRequest, UploadResponse, UploadedFile};
use crate::config::{StorageConfig, UploadDriverKind};
use crate::storage::{join_key, Disk};
use async_trait::async_trait;
use axum::http::Method;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 整文件保存时文件名冲突的最大尝试次数
pub const MONOLITH_SAVE_ATTEMPTS: usize = 3;

/// 单次请求的处理上下文
pub struct UploadContext<'a> {
    /// 目标磁盘
    pub disk: &'a dyn Disk,
    /// 存储配置（只读）
    pub config: &'a StorageConfig,
    /// 携带文件的表单字段名
    pub file_param: &'a str,
    /// 整文件上传的文件名生成器
    pub identifier: &'a dyn Identifier,
    /// 完成通知
    pub notifier: &'a dyn CompletionNotifier,
}

/// 上传驱动
#[async_trait]
pub trait UploadDriver: Send + Sync {
    /// 驱动名称
    fn name(&self) -> &'static str;

    /// 处理一次请求
    async fn handle(
        &self,
        request: UploadRequest,
        ctx: &UploadContext<'_>,
    ) -> UploadResult<UploadResponse>;
}

/// 根据配置创建驱动
pub fn driver_for(kind: UploadDriverKind) -> Arc<dyn UploadDriver> {
    match kind {
        UploadDriverKind::Dropzone => Arc::new(DropzoneUploadDriver::new(DropzoneProtocol)),
        UploadDriverKind::Resumable => Arc::new(ResumableUploadDriver::new(ResumableProtocol)),
        UploadDriverKind::Monolith => Arc::new(MonolithUploadDriver),
    }
}

/// 取出请求中的文件部分
fn uploaded_file<'r>(
    request: &'r UploadRequest,
    ctx: &UploadContext<'_>,
) -> UploadResult<&'r UploadedFile> {
    let file = request
        .file(ctx.file_param)
        .ok_or_else(|| UploadError::BadRequest("请求中未找到上传文件".to_string()))?;

    if let Some(error) = &file.error {
        return Err(UploadError::UploadIo(error.clone()));
    }
    Ok(file)
}

/// 合并目录下的文件路径，文件名必须是单个合法路径段
fn merged_path(name: &str, ctx: &UploadContext<'_>) -> UploadResult<String> {
    if name.is_empty() || sanitize_file_name(name) != name {
        return Err(UploadError::BadRequest(format!("非法文件名: {}", name)));
    }
    Ok(join_key(&ctx.config.merged_directory, name))
}

/// 合并目录下文件的下载信息
pub async fn file_response(name: &str, ctx: &UploadContext<'_>) -> UploadResult<DownloadFile> {
    let path = merged_path(name, ctx)?;
    if !ctx.disk.exists(&path).await? {
        return Err(UploadError::NotFound(name.to_string()));
    }

    let size = ctx.disk.size(&path).await?;
    Ok(DownloadFile {
        filename: name.to_string(),
        absolute_path: ctx.disk.absolute_path(&path),
        path,
        size,
    })
}

/// 删除合并目录下的文件
pub async fn delete_file(name: &str, ctx: &UploadContext<'_>) -> UploadResult<UploadResponse> {
    let path = merged_path(name, ctx)?;
    if !ctx.disk.exists(&path).await? {
        return Err(UploadError::NotFound(name.to_string()));
    }

    ctx.disk.delete(&path).await?;
    info!("已删除文件: {}", path);
    Ok(UploadResponse::Deleted {
        filename: name.to_string(),
    })
}

/// 整文件保存
///
/// 仅在目标不存在时写入，冲突时重新生成文件名，不会覆盖无关文件
pub async fn save_monolith(
    file: &UploadedFile,
    ctx: &UploadContext<'_>,
) -> UploadResult<UploadResponse> {
    let metadata = file.metadata();
    let mut last_name = String::new();

    for attempt in 1..=MONOLITH_SAVE_ATTEMPTS {
        let name = ctx.identifier.generate(&metadata);
        let path = join_key(&ctx.config.merged_directory, &name);

        let created = ctx
            .disk
            .put_if_absent(&path, file.data.clone())
            .await
            .map_err(UploadError::StorageWrite)?;

        if created {
            info!(
                "整文件上传完成: {} -> {} ({} bytes)",
                metadata.original_name, path, metadata.size
            );
            ctx.notifier.notify(&FileUploaded {
                disk: ctx.config.disk.clone(),
                path,
                size: metadata.size,
            });
            return Ok(UploadResponse::Progress(UploadProgress::finished(name)));
        }

        warn!("文件名冲突: {} (第 {} 次尝试)", name, attempt);
        last_name = name;
    }

    Err(UploadError::AlreadyExists(last_name))
}

/// 分片上传驱动
///
/// 协议适配器决定字段名与最后一片的规则，其余流程各协议共用
pub struct ChunkedUploadDriver<P> {
    protocol: P,
}

/// Dropzone 驱动
pub type DropzoneUploadDriver = ChunkedUploadDriver<DropzoneProtocol>;

/// resumable.js 驱动
pub type ResumableUploadDriver = ChunkedUploadDriver<ResumableProtocol>;

impl<P: ChunkProtocol> ChunkedUploadDriver<P> {
    pub fn new(protocol: P) -> Self {
        Self { protocol }
    }

    async fn save(
        &self,
        request: &UploadRequest,
        ctx: &UploadContext<'_>,
    ) -> UploadResult<UploadResponse> {
        let file = uploaded_file(request, ctx)?;

        if self.protocol.is_monolith(request) {
            return save_monolith(file, ctx).await;
        }

        let descriptor = self.protocol.extract(request)?;
        let upload_id = descriptor.upload_id.as_str();
        let output_name = merged_file_name(upload_id, file);
        let store = ChunkStore::new(ctx.disk, &ctx.config.chunk_directory);

        if store.is_completed(upload_id).await? {
            debug!(
                "上传已完成，忽略分片: upload_id={}, index={}",
                upload_id, descriptor.chunk_index
            );
            return Ok(UploadResponse::Progress(UploadProgress::finished(output_name)));
        }

        range::validate(&descriptor, file.size())?;

        // 新上传的输出文件名已被占用：拒绝，不覆盖无关文件
        if !store.has_manifest(upload_id).await? {
            let merged_path = join_key(&ctx.config.merged_directory, &output_name);
            if ctx.disk.exists(&merged_path).await? {
                warn!(
                    "合并文件已存在，拒绝新的分片上传: upload_id={}, path={}",
                    upload_id, merged_path
                );
                return Err(UploadError::AlreadyExists(output_name));
            }
        }

        let manifest = store
            .record_manifest(upload_id, &UploadManifest::from_descriptor(&descriptor))
            .await?;
        manifest.check(&descriptor)?;

        store
            .put(upload_id, descriptor.chunk_index, file.data.clone())
            .await?;

        let present = store.list(upload_id).await?;
        let total = manifest.total_chunk_count;
        if !progress::is_complete(&present, total) {
            // 分片到达前其他请求刚完成并清理：清掉本次重新创建的目录
            if store.is_completed(upload_id).await? {
                if ctx.config.sweep {
                    merge::sweep(ctx.disk, ctx.config, upload_id).await;
                }
                return Ok(UploadResponse::Progress(UploadProgress::finished(output_name)));
            }

            let percentage = progress::percentage(progress::present_count(&present, total), total);
            debug!(
                "[{}] 分片已接收: upload_id={}, index={}, 进度={}%",
                self.protocol.name(),
                upload_id,
                descriptor.chunk_index,
                percentage
            );
            return Ok(UploadResponse::Progress(UploadProgress::partial(percentage)));
        }

        self.complete(&descriptor, &manifest, &output_name, ctx).await
    }

    /// 合并、校验大小、抢占完成标记，成功者负责清理与通知
    async fn complete(
        &self,
        descriptor: &UploadDescriptor,
        manifest: &UploadManifest,
        output_name: &str,
        ctx: &UploadContext<'_>,
    ) -> UploadResult<UploadResponse> {
        let upload_id = descriptor.upload_id.as_str();
        let store = ChunkStore::new(ctx.disk, &ctx.config.chunk_directory);

        let merged = match merge::merge(
            ctx.disk,
            ctx.config,
            upload_id,
            manifest.total_chunk_count,
            output_name,
        )
        .await
        {
            Ok(merged) => merged,
            Err(UploadError::IncompleteMerge { missing_index, .. }) => {
                // 其他请求已合并并清理了分片
                debug!(
                    "合并时分片 #{} 已不存在: upload_id={}",
                    missing_index, upload_id
                );
                return self.progress_after_race(upload_id, manifest, output_name, ctx).await;
            }
            Err(e) => return Err(e),
        };

        if merged.size != manifest.total_file_size {
            if let Err(e) = ctx.disk.delete(&merged.path).await {
                warn!("删除大小不一致的合并文件失败: {}, 错误: {}", merged.path, e);
            }
            return Err(UploadError::MergeSizeMismatch {
                expected: manifest.total_file_size,
                actual: merged.size,
            });
        }

        if store
            .claim_completion(upload_id, &merged.path, merged.size)
            .await?
        {
            if ctx.config.sweep {
                merge::sweep(ctx.disk, ctx.config, upload_id).await;
            }
            ctx.notifier.notify(&FileUploaded {
                disk: merged.disk.clone(),
                path: merged.path.clone(),
                size: merged.size,
            });
        } else {
            debug!("上传已由其他请求完成: upload_id={}", upload_id);
        }

        Ok(UploadResponse::Progress(UploadProgress::finished(output_name)))
    }

    async fn progress_after_race(
        &self,
        upload_id: &str,
        manifest: &UploadManifest,
        output_name: &str,
        ctx: &UploadContext<'_>,
    ) -> UploadResult<UploadResponse> {
        let merged_path = join_key(&ctx.config.merged_directory, output_name);
        if ctx.disk.exists(&merged_path).await? {
            return Ok(UploadResponse::Progress(UploadProgress::finished(output_name)));
        }

        let store = ChunkStore::new(ctx.disk, &ctx.config.chunk_directory);
        let present = store.list(upload_id).await?;
        let total = manifest.total_chunk_count;
        debug!(
            "合并未完成: upload_id={}, 缺失分片={:?}",
            upload_id,
            progress::first_missing(&present, total)
        );
        Ok(UploadResponse::Progress(UploadProgress::partial(
            progress::percentage(progress::present_count(&present, total), total),
        )))
    }
}

#[async_trait]
impl<P: ChunkProtocol> UploadDriver for ChunkedUploadDriver<P> {
    fn name(&self) -> &'static str {
        self.protocol.name()
    }

    async fn handle(
        &self,
        request: UploadRequest,
        ctx: &UploadContext<'_>,
    ) -> UploadResult<UploadResponse> {
        if request.method != Method::POST {
            return Err(UploadError::post_only(request.method));
        }
        self.save(&request, ctx).await
    }
}

/// 分片合并后的文件名：上传 ID + 原始扩展名
fn merged_file_name(upload_id: &str, file: &UploadedFile) -> String {
    match file.extension() {
        Some(ext) => format!("{}.{}", upload_id, ext),
        None => upload_id.to_string(),
    }
}

/// 整文件上传驱动
///
/// POST 保存，GET ?file= 下载，DELETE ?file= 删除
#[derive(Debug, Clone, Copy, Default)]
pub struct MonolithUploadDriver;

impl MonolithUploadDriver {
    const FILE_QUERY: &'static str = "file";

    fn requested_name(request: &UploadRequest) -> UploadResult<&str> {
        request
            .field(Self::FILE_QUERY)
            .ok_or_else(|| UploadError::MissingField(Self::FILE_QUERY.to_string()))
    }
}

#[async_trait]
impl UploadDriver for MonolithUploadDriver {
    fn name(&self) -> &'static str {
        "monolith"
    }

    async fn handle(
        &self,
        request: UploadRequest,
        ctx: &UploadContext<'_>,
    ) -> UploadResult<UploadResponse> {
        match request.method {
            Method::POST => {
                let file = uploaded_file(&request, ctx)?;
                save_monolith(file, ctx).await
            }
            Method::GET => {
                let name = Self::requested_name(&request)?;
                Ok(UploadResponse::Download(file_response(name, ctx).await?))
            }
            Method::DELETE => {
                let name = Self::requested_name(&request)?;
                delete_file(name, ctx).await
            }
            method => Err(UploadError::MethodNotAllowed {
                method,
                allowed: vec![Method::GET, Method::POST, Method::DELETE],
            }),
        }
    }
}

// 上传处理入口
//
// 持有驱动、文件名生成器、磁盘与通知者，对外只暴露 handle / download

use super::driver::{driver_for, file_response, UploadContext, UploadDriver};
use super::error::UploadResult;
use super::identifier::{self, Identifier};
use super::notify::CompletionNotifier;
use super::request::{DownloadFile, UploadRequest, UploadResponse};
use crate::config::{StorageConfig, UploadConfig};
use crate::storage::Disk;
use std::sync::Arc;
use tracing::info;

/// 上传处理器
pub struct UploadHandler {
    driver: Arc<dyn UploadDriver>,
    identifier: Arc<dyn Identifier>,
    storage: StorageConfig,
    file_param: String,
    disk: Arc<dyn Disk>,
    notifier: Arc<dyn CompletionNotifier>,
}

impl UploadHandler {
    /// 按配置创建处理器
    pub fn new(
        upload: &UploadConfig,
        storage: StorageConfig,
        disk: Arc<dyn Disk>,
        notifier: Arc<dyn CompletionNotifier>,
    ) -> Self {
        let driver = driver_for(upload.driver);
        info!(
            "上传处理器已创建: 驱动={}, 磁盘={} ({}), 合并目录={}, 分片目录={}",
            driver.name(),
            storage.disk,
            disk.backend_name(),
            storage.merged_directory,
            storage.chunk_directory
        );

        Self {
            driver,
            identifier: identifier::from_kind(upload.identifier),
            storage,
            file_param: upload.file_param.clone(),
            disk,
            notifier,
        }
    }

    pub fn driver_name(&self) -> &'static str {
        self.driver.name()
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    pub fn disk(&self) -> &Arc<dyn Disk> {
        &self.disk
    }

    fn context(&self) -> UploadContext<'_> {
        UploadContext {
            disk: self.disk.as_ref(),
            config: &self.storage,
            file_param: &self.file_param,
            identifier: self.identifier.as_ref(),
            notifier: self.notifier.as_ref(),
        }
    }

    /// 处理一次上传请求
    pub async fn handle(&self, request: UploadRequest) -> UploadResult<UploadResponse> {
        self.driver.handle(request, &self.context()).await
    }

    /// 下载合并目录下的文件
    pub async fn download(&self, name: &str) -> UploadResult<DownloadFile> {
        file_response(name, &self.context()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadDriverKind;
    use crate::storage::MemoryDisk;
    use crate::uploader::error::UploadError;
    use crate::uploader::notify::LoggingNotifier;
    use crate::uploader::request::UploadedFile;
    use axum::http::Method;

    fn handler(kind: UploadDriverKind) -> UploadHandler {
        let upload = UploadConfig {
            driver: kind,
            ..UploadConfig::default()
        };
        UploadHandler::new(
            &upload,
            StorageConfig::default(),
            Arc::new(MemoryDisk::new()),
            Arc::new(LoggingNotifier),
        )
    }

    #[tokio::test]
    async fn test_driver_selected_from_config() {
        assert_eq!(handler(UploadDriverKind::Dropzone).driver_name(), "dropzone");
        assert_eq!(handler(UploadDriverKind::Resumable).driver_name(), "resumable");
        assert_eq!(handler(UploadDriverKind::Monolith).driver_name(), "monolith");
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let handler = handler(UploadDriverKind::Dropzone);

        let request = UploadRequest::new(Method::POST)
            .with_file("file", UploadedFile::new("a.txt", &b"hello world"[..]));
        let name = match handler.handle(request).await.unwrap() {
            UploadResponse::Progress(progress) => progress.merged_file.unwrap(),
            other => panic!("unexpected: {:?}", other),
        };

        let download = handler.download(&name).await.unwrap();
        assert_eq!(download.size, 11);
        assert_eq!(download.path, format!("merged/{}", name));

        assert!(matches!(
            handler.download("nope.txt").await,
            Err(UploadError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_custom_file_param() {
        let upload = UploadConfig {
            file_param: "upload".to_string(),
            ..UploadConfig::default()
        };
        let handler = UploadHandler::new(
            &upload,
            StorageConfig::default(),
            Arc::new(MemoryDisk::new()),
            Arc::new(LoggingNotifier),
        );

        let request = UploadRequest::new(Method::POST)
            .with_file("file", UploadedFile::new("a.txt", &b"x"[..]));
        assert!(matches!(
            handler.handle(request).await,
            Err(UploadError::BadRequest(_))
        ));

        let request = UploadRequest::new(Method::POST)
            .with_file("upload", UploadedFile::new("a.txt", &b"x"[..]));
        assert!(handler.handle(request).await.is_ok());
    }
}

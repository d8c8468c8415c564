// 应用状态

use crate::config::AppConfig;
use crate::storage::DiskManager;
use crate::uploader::{
    BroadcastNotifier, FileUploaded, LoggingNotifier, NotifierChain, UploadHandler,
};
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::broadcast;

/// 完成事件广播通道容量
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// 应用全局状态
#[derive(Clone)]
pub struct AppState {
    /// 应用配置（启动后只读）
    pub config: Arc<AppConfig>,
    /// 磁盘管理器
    pub disks: DiskManager,
    /// 上传处理器
    pub upload_handler: Arc<UploadHandler>,
    /// 上传完成事件
    pub events: BroadcastNotifier,
}

impl AppState {
    /// 根据配置创建应用状态
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let disks = DiskManager::from_config(&config.disks)
            .await
            .context("初始化磁盘失败")?;
        Self::with_disks(config, disks)
    }

    /// 使用已创建的磁盘构建状态
    pub fn with_disks(config: AppConfig, disks: DiskManager) -> anyhow::Result<Self> {
        let disk = disks
            .disk(&config.storage.disk)
            .context("解析上传磁盘失败")?;

        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let events = BroadcastNotifier::new(sender);
        let notifier = NotifierChain::new()
            .with(Arc::new(LoggingNotifier))
            .with(Arc::new(events.clone()));

        let upload_handler = UploadHandler::new(
            &config.upload,
            config.storage.clone(),
            disk,
            Arc::new(notifier),
        );

        Ok(Self {
            config: Arc::new(config),
            disks,
            upload_handler: Arc::new(upload_handler),
            events,
        })
    }

    /// 订阅上传完成事件
    pub fn subscribe(&self) -> broadcast::Receiver<FileUploaded> {
        self.events.subscribe()
    }
}

// Chunk Uploader Library
// 分片上传服务核心库

// 配置管理模块
pub mod config;

// 日志系统
pub mod logging;

// Web服务器模块
pub mod server;

// 存储后端模块
pub mod storage;

// 上传核心模块
pub mod uploader;

// 导出常用类型
pub use config::{AppConfig, StorageConfig};
pub use server::AppState;
pub use storage::{Disk, DiskManager, LocalDisk, MemoryDisk, StorageError};
pub use uploader::{
    FileUploaded, UploadDriver, UploadError, UploadHandler, UploadProgress, UploadRequest,
    UploadResponse,
};

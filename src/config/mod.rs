// 配置管理模块

pub mod path_validator;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;

pub use path_validator::{PathValidationResult, PathValidator};

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 上传存储配置
    #[serde(default)]
    pub storage: StorageConfig,
    /// 磁盘定义（名称 -> 后端）
    #[serde(default = "default_disks")]
    pub disks: HashMap<String, DiskConfig>,
    /// 上传协议配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
        }
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 单个请求体上限 (MB)
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: u64,
}

fn default_body_limit_mb() -> u64 {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 18890,
            body_limit_mb: default_body_limit_mb(),
        }
    }
}

/// 上传存储配置
///
/// 每次处理上传时以只读方式传入核心逻辑
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// 使用的磁盘名称（对应 `disks` 中的键）
    #[serde(default = "default_disk")]
    pub disk: String,
    /// 合并后文件所在目录
    #[serde(default = "default_merged_directory")]
    pub merged_directory: String,
    /// 分片临时目录
    #[serde(default = "default_chunk_directory")]
    pub chunk_directory: String,
    /// 合并成功后是否清理分片目录
    #[serde(default = "default_sweep")]
    pub sweep: bool,
}

fn default_disk() -> String {
    "local".to_string()
}

fn default_merged_directory() -> String {
    "merged".to_string()
}

fn default_chunk_directory() -> String {
    "chunks".to_string()
}

fn default_sweep() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            disk: default_disk(),
            merged_directory: default_merged_directory(),
            chunk_directory: default_chunk_directory(),
            sweep: default_sweep(),
        }
    }
}

impl StorageConfig {
    /// 校验目录配置：相对路径、无 `..`、两目录互不包含
    pub fn validate(&self) -> Result<()> {
        for (name, dir) in [
            ("merged_directory", &self.merged_directory),
            ("chunk_directory", &self.chunk_directory),
        ] {
            crate::storage::key_segments(dir)
                .map_err(|_| anyhow::anyhow!("{} 不是合法的相对目录: {:?}", name, dir))?;
        }

        let merged = format!("{}/", self.merged_directory.trim_end_matches('/'));
        let chunks = format!("{}/", self.chunk_directory.trim_end_matches('/'));
        if merged.starts_with(&chunks) || chunks.starts_with(&merged) {
            anyhow::bail!(
                "merged_directory 与 chunk_directory 不能相同或互相包含: {:?} / {:?}",
                self.merged_directory,
                self.chunk_directory
            );
        }
        Ok(())
    }
}

/// 磁盘后端配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum DiskConfig {
    /// 本地文件系统
    Local { root: PathBuf },
    /// 进程内存（重启即丢失）
    Memory,
}

fn default_disks() -> HashMap<String, DiskConfig> {
    let mut disks = HashMap::new();
    disks.insert(
        default_disk(),
        DiskConfig::Local {
            root: PathBuf::from("storage"),
        },
    );
    disks
}

/// 上传驱动类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UploadDriverKind {
    /// Dropzone 分片协议
    #[default]
    Dropzone,
    /// resumable.js 分片协议
    Resumable,
    /// 不分片，仅整文件上传
    Monolith,
}

/// 整文件上传的文件名生成方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    /// sha1(原文件名 + 大小 + 到达时间 + 随机数)
    #[default]
    Hash,
    /// UUID v4
    Uuid,
    /// 清洗后的原始文件名
    Original,
}

/// 上传协议配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 上传驱动
    #[serde(default)]
    pub driver: UploadDriverKind,
    /// 携带文件内容的表单字段名
    #[serde(default = "default_file_param")]
    pub file_param: String,
    /// 整文件上传的命名方式
    #[serde(default)]
    pub identifier: IdentifierKind,
}

fn default_file_param() -> String {
    "file".to_string()
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            driver: UploadDriverKind::default(),
            file_param: default_file_param(),
            identifier: IdentifierKind::default(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            disks: default_disks(),
            upload: UploadConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// 校验配置的整体一致性
    pub fn validate(&self) -> Result<()> {
        if !self.disks.contains_key(&self.storage.disk) {
            anyhow::bail!(
                "storage.disk 引用了未定义的磁盘: {:?}（已定义: {:?}）",
                self.storage.disk,
                self.disks.keys().collect::<Vec<_>>()
            );
        }

        self.storage.validate().context("存储目录配置无效")?;

        if self.upload.file_param.trim().is_empty() {
            anyhow::bail!("upload.file_param 不能为空");
        }
        Ok(())
    }

    /// 校验并准备本地磁盘根目录
    pub fn prepare_disks(&self) -> Result<()> {
        for (name, disk) in &self.disks {
            if let DiskConfig::Local { root } = disk {
                PathValidator::prepare(root)
                    .with_context(|| format!("磁盘 {} 的根目录不可用", name))?;
            }
        }
        Ok(())
    }

    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate().context("配置文件校验失败")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        self.validate().context("保存配置失败")?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        if let Some(parent) = std::path::Path::new(path).parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {}", path);
        Ok(())
    }

    /// 加载或创建默认配置
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {:#}", e);
                let default_config = Self::default();

                if let Err(e) = default_config.save_to_file(path).await {
                    tracing::error!("保存默认配置失败: {:#}", e);
                }

                default_config
            }
        }
    }
}

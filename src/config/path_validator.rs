// 磁盘根目录校验

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 路径验证结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathValidationResult {
    /// 路径是否完全可用
    pub valid: bool,
    /// 路径是否存在
    pub exists: bool,
    /// 是否是目录
    pub is_directory: bool,
    /// 路径是否可写
    pub is_writable: bool,
    /// 验证消息
    pub message: String,
    /// 详细错误信息（如果有）
    pub details: Option<String>,
}

impl PathValidationResult {
    fn success() -> Self {
        Self {
            valid: true,
            exists: true,
            is_directory: true,
            is_writable: true,
            message: "路径验证通过".to_string(),
            details: None,
        }
    }
}

/// 路径验证器
pub struct PathValidator;

impl PathValidator {
    /// 验证磁盘根目录：存在、是目录、可写
    pub fn validate(path: &Path) -> PathValidationResult {
        if !path.exists() {
            return PathValidationResult {
                valid: false,
                exists: false,
                is_directory: false,
                is_writable: false,
                message: "路径不存在".to_string(),
                details: Some(format!("磁盘根目录 {:?} 不存在", path)),
            };
        }

        if !path.is_dir() {
            return PathValidationResult {
                valid: false,
                exists: true,
                is_directory: false,
                is_writable: false,
                message: "路径不是目录".to_string(),
                details: Some(format!("磁盘根目录 {:?} 不是一个目录", path)),
            };
        }

        if !Self::check_writable(path) {
            return PathValidationResult {
                valid: false,
                exists: true,
                is_directory: true,
                is_writable: false,
                message: "路径不可写".to_string(),
                details: Some(format!("磁盘根目录 {:?} 没有写入权限", path)),
            };
        }

        PathValidationResult::success()
    }

    /// 通过创建探测文件检测写入权限
    fn check_writable(path: &Path) -> bool {
        let probe = path.join(format!(".write_test_{}", std::process::id()));
        match fs::File::create(&probe) {
            Ok(_) => {
                let _ = fs::remove_file(&probe);
                true
            }
            Err(_) => false,
        }
    }

    /// 确保目录存在后再校验，失败时返回带详情的错误
    pub fn prepare(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path).with_context(|| format!("无法创建目录: {:?}", path))?;
            tracing::info!("自动创建磁盘根目录: {:?}", path);
        }

        let result = Self::validate(path);
        if !result.valid {
            let details = result.details.as_deref().unwrap_or("无详细信息");
            anyhow::bail!("{}。详情: {}", result.message, details);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_existing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let result = PathValidator::validate(temp_dir.path());

        assert!(result.valid);
        assert!(result.is_directory);
        assert!(result.is_writable);
    }

    #[test]
    fn test_validate_non_existing_path() {
        let result = PathValidator::validate(Path::new("/non/existing/path/12345"));
        assert!(!result.valid);
        assert!(!result.exists);
        assert_eq!(result.message, "路径不存在");
    }

    #[test]
    fn test_validate_file_instead_of_directory() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("plain.txt");
        fs::write(&file_path, "x").unwrap();

        let result = PathValidator::validate(&file_path);
        assert!(!result.valid);
        assert!(result.exists);
        assert_eq!(result.message, "路径不是目录");
    }

    #[test]
    fn test_prepare_creates_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("storage").join("local");

        PathValidator::prepare(&root).unwrap();
        assert!(root.is_dir());

        // 已存在时再次调用也应成功
        PathValidator::prepare(&root).unwrap();
    }
}

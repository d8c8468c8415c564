use anyhow::Context;
use chunk_uploader::{config::LogConfig, logging, server, AppConfig, AppState};
use tracing::info;

/// 配置文件路径
const CONFIG_PATH: &str = "config/app.toml";

/// 加载日志配置
///
/// 日志系统需要在完整配置之前初始化，这里只读取 `[log]` 段，失败时返回默认配置
async fn load_log_config() -> LogConfig {
    if let Ok(content) = tokio::fs::read_to_string(CONFIG_PATH).await {
        if let Ok(config) = toml::from_str::<toml::Value>(&content) {
            if let Some(log_table) = config.get("log") {
                if let Ok(log_config) = log_table.clone().try_into::<LogConfig>() {
                    return log_config;
                }
            }
        }
    }

    LogConfig::default()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 先初始化日志系统（必须保持 _log_guard 存活）
    let log_config = load_log_config().await;
    let _log_guard = logging::init_logging(&log_config);

    info!("{} v{} 启动中...", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load_or_default(CONFIG_PATH).await;
    config.validate().context("配置校验失败")?;
    config.prepare_disks()?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app_state = AppState::new(config).await?;
    info!(
        "应用状态初始化完成: 驱动={}, 磁盘={}",
        app_state.upload_handler.driver_name(),
        app_state.upload_handler.storage().disk
    );

    let app = server::build_router(app_state);

    info!("服务器启动在: http://{}", addr);
    info!("上传接口: http://{}/api/v1/upload", addr);
    info!("下载接口: http://{}/api/v1/files/:name", addr);
    info!("健康检查: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {}", addr))?;

    // 监听关闭信号，支持优雅关闭
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("服务器错误: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("收到 Ctrl+C，开始优雅关闭...");
        }
    }

    info!("应用已安全退出");
    Ok(())
}

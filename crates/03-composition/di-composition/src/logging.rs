//! 日志初始化

use di_common::ComponentError;
use serde::{Deserialize, Serialize};
use tracing::{info, Level};

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 启动时是否初始化日志
    pub enabled: bool,
    /// 日志级别
    pub level: String,
    /// 是否显示目标
    pub show_target: bool,
    /// 是否显示线程ID
    pub show_thread_ids: bool,
    /// 是否显示文件名
    pub show_file: bool,
    /// 是否显示行号
    pub show_line_number: bool,
    /// 是否使用 JSON 格式
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "info".to_string(),
            show_target: true,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// 创建开发环境日志配置
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            show_target: true,
            show_thread_ids: true,
            show_file: true,
            show_line_number: true,
            json_format: false,
        }
    }

    /// 创建生产环境日志配置
    pub fn production() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            show_target: false,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: true,
        }
    }

    /// 解析日志级别
    pub fn max_level(&self) -> Result<Level, ComponentError> {
        self.level
            .parse::<Level>()
            .map_err(|_| ComponentError::configuration(format!("无效的日志级别: {}", self.level)))
    }
}

/// 初始化全局日志订阅者
///
/// 每个进程只能成功一次，重复初始化返回 `BootstrapFailed`
pub fn init_logging(config: &LoggingConfig) -> Result<(), ComponentError> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(config.max_level()?)
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids)
        .with_file(config.show_file)
        .with_line_number(config.show_line_number);

    if config.json_format {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    }
    .map_err(|e| ComponentError::bootstrap_failed(format!("日志初始化失败: {}", e)))?;

    info!("日志系统初始化完成");
    Ok(())
}

//! 容器设置
//!
//! 设置文件分为三节：`container`（容器配置）、`beans`（Bean 描述）和
//! `logging`（日志）。多个来源按添加顺序叠加，后添加的覆盖先添加的。

use crate::logging::LoggingConfig;
use config::{Config, File, FileFormat};
use di_abstractions::BeansDescriptor;
use di_common::{ComponentError, ContainerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 环境变量中按列表解析的键
const LIST_KEYS: [&str; 4] = [
    "beans.alternatives",
    "beans.interceptors",
    "beans.decorators",
    "beans.default_interceptors",
];

/// 容器设置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSettings {
    /// 容器配置
    pub container: ContainerConfig,
    /// Bean 描述
    pub beans: BeansDescriptor,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 设置来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsSource {
    /// TOML 文件
    Toml(PathBuf),
    /// JSON 文件
    Json(PathBuf),
    /// 带前缀的环境变量，嵌套键用 `__` 分隔，例如 `WEAVE_CONTAINER__MAX_RESOLUTION_DEPTH`
    Environment {
        /// 变量前缀
        prefix: String,
    },
}

impl SettingsSource {
    fn describe(&self) -> String {
        match self {
            Self::Toml(path) => format!("TOML 文件 {}", path.display()),
            Self::Json(path) => format!("JSON 文件 {}", path.display()),
            Self::Environment { prefix } => format!("环境变量 {}_*", prefix),
        }
    }
}

/// 设置加载器
#[derive(Debug, Clone, Default)]
pub struct SettingsLoader {
    sources: Vec<SettingsSource>,
}

impl SettingsLoader {
    /// 创建空的加载器
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加设置来源
    pub fn add_source(mut self, source: SettingsSource) -> Self {
        debug!("添加设置来源: {}", source.describe());
        self.sources.push(source);
        self
    }

    /// 添加 TOML 文件，文件必须存在
    pub fn add_toml<P: AsRef<Path>>(self, path: P) -> Result<Self, ComponentError> {
        let path = existing(path.as_ref())?;
        Ok(self.add_source(SettingsSource::Toml(path)))
    }

    /// 添加 JSON 文件，文件必须存在
    pub fn add_json<P: AsRef<Path>>(self, path: P) -> Result<Self, ComponentError> {
        let path = existing(path.as_ref())?;
        Ok(self.add_source(SettingsSource::Json(path)))
    }

    /// 添加环境变量来源
    pub fn add_env_vars(self, prefix: impl Into<String>) -> Self {
        self.add_source(SettingsSource::Environment {
            prefix: prefix.into(),
        })
    }

    /// 已添加的来源
    pub fn sources(&self) -> &[SettingsSource] {
        &self.sources
    }

    /// 加载并合并所有来源
    pub fn load(&self) -> Result<ContainerSettings, ComponentError> {
        if self.sources.is_empty() {
            debug!("没有设置来源, 使用默认设置");
            return Ok(ContainerSettings::default());
        }

        let mut builder = Config::builder();
        for source in &self.sources {
            builder = match source {
                SettingsSource::Toml(path) => {
                    builder.add_source(File::from(path.as_path()).format(FileFormat::Toml))
                }
                SettingsSource::Json(path) => {
                    builder.add_source(File::from(path.as_path()).format(FileFormat::Json))
                }
                SettingsSource::Environment { prefix } => {
                    let environment = LIST_KEYS.iter().fold(
                        config::Environment::with_prefix(prefix)
                            .prefix_separator("_")
                            .separator("__")
                            .try_parsing(true)
                            .list_separator(","),
                        |environment, key| environment.with_list_parse_key(key),
                    );
                    builder.add_source(environment)
                }
            };
        }

        let settings = builder
            .build()
            .map_err(|e| ComponentError::configuration(format!("读取设置失败: {}", e)))?
            .try_deserialize::<ContainerSettings>()
            .map_err(|e| ComponentError::configuration(format!("解析设置失败: {}", e)))?;
        info!("设置加载完成: {} 个来源", self.sources.len());
        Ok(settings)
    }
}

fn existing(path: &Path) -> Result<PathBuf, ComponentError> {
    if !path.exists() {
        return Err(ComponentError::configuration(format!(
            "配置文件不存在: {}",
            path.display()
        )));
    }
    Ok(path.to_path_buf())
}

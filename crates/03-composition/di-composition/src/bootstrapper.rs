//! 容器启动器

use crate::logging::{init_logging, LoggingConfig};
use crate::settings::{ContainerSettings, SettingsLoader};
use di_abstractions::{AnnotatedType, ScanTarget, TypeScanner};
use di_common::{ComponentError, ContainerResult};
use di_impl::{Container, ContainerBuilder, Extension};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

type Configure = Box<dyn FnOnce(ContainerBuilder) -> ContainerBuilder + Send>;

/// 容器启动器
///
/// 负责协调设置加载、日志初始化、类型扫描和容器引导的顺序
#[derive(Default)]
pub struct ContainerBootstrapper {
    loader: SettingsLoader,
    settings: Option<ContainerSettings>,
    logging: Option<LoggingConfig>,
    scanners: Vec<Arc<dyn TypeScanner>>,
    targets: Vec<ScanTarget>,
    types: Vec<Arc<dyn AnnotatedType>>,
    extensions: Vec<Arc<dyn Extension>>,
    configure: Vec<Configure>,
}

impl ContainerBootstrapper {
    /// 创建新的启动器
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加 TOML 设置文件
    pub fn add_config_toml<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ComponentError> {
        self.loader = self.loader.add_toml(path)?;
        Ok(self)
    }

    /// 添加 JSON 设置文件
    pub fn add_config_json<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ComponentError> {
        self.loader = self.loader.add_json(path)?;
        Ok(self)
    }

    /// 添加环境变量设置来源
    pub fn add_config_env_vars(mut self, prefix: impl Into<String>) -> Self {
        self.loader = self.loader.add_env_vars(prefix);
        self
    }

    /// 直接指定设置，忽略所有设置来源
    pub fn with_settings(mut self, settings: ContainerSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// 覆盖设置中的日志配置
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// 添加类型扫描器
    pub fn add_type_scanner(mut self, scanner: Arc<dyn TypeScanner>) -> Self {
        self.scanners.push(scanner);
        self
    }

    /// 添加扫描目标，未指定时扫描所有类型
    pub fn scan(mut self, target: ScanTarget) -> Self {
        self.targets.push(target);
        self
    }

    /// 直接添加类型
    pub fn add_type(mut self, annotated: Arc<dyn AnnotatedType>) -> Self {
        self.types.push(annotated);
        self
    }

    /// 注册可移植扩展
    pub fn add_extension(mut self, extension: Arc<dyn Extension>) -> Self {
        self.extensions.push(extension);
        self
    }

    /// 在引导前调整容器构建器
    pub fn configure<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(ContainerBuilder) -> ContainerBuilder + Send + 'static,
    {
        self.configure.push(Box::new(configure));
        self
    }

    /// 启动容器
    pub async fn bootstrap(self) -> ContainerResult<Container> {
        let settings = match self.settings {
            Some(settings) => settings,
            None => self.loader.load()?,
        };

        let logging = self.logging.unwrap_or_else(|| settings.logging.clone());
        if logging.enabled {
            init_logging(&logging)?;
        }
        info!("开始启动容器");

        let targets = if self.targets.is_empty() {
            vec![ScanTarget::All]
        } else {
            self.targets
        };

        let mut discovered = Vec::new();
        for scanner in &self.scanners {
            for target in &targets {
                if !scanner.supports(target) {
                    debug!("扫描器 {} 不支持目标 {}", scanner.name(), target.as_str());
                    continue;
                }
                let found = scanner.scan(target).await.map_err(|e| {
                    ComponentError::scan_error(format!("扫描器 {} 失败: {}", scanner.name(), e))
                })?;
                info!("扫描器 {} 在 {} 中发现 {} 个类型", scanner.name(), target.as_str(), found.len());
                discovered.extend(found);
            }
        }
        discovered.extend(self.types);
        if discovered.is_empty() {
            warn!("没有发现任何类型");
        }

        let mut builder = Container::builder()
            .with_config(settings.container)
            .with_descriptor(settings.beans)
            .add_types(discovered);
        for extension in self.extensions {
            builder = builder.add_extension(extension);
        }
        for configure in self.configure {
            builder = configure(builder);
        }

        let container = builder.build()?;
        info!("容器启动完成");
        Ok(container)
    }
}

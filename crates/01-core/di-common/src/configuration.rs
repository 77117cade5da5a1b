//! 容器配置

use serde::{Deserialize, Serialize};

/// Bean 发现模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMode {
    /// 所有未排除且有可用构造函数的具体类型都是 Bean
    All,
    /// 只有带 Bean 定义标记（作用域、构造型、拦截器、装饰器）的类型才是 Bean
    Annotated,
    /// 不发现任何 Bean
    None,
}

impl Default for DiscoveryMode {
    fn default() -> Self {
        Self::Annotated
    }
}

/// 容器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// 是否启用循环依赖检测
    pub enable_circular_dependency_detection: bool,
    /// 最大解析深度
    pub max_resolution_depth: usize,
    /// 是否启用部署验证
    pub enable_validation: bool,
    /// 发现模式，描述文件中声明的模式优先
    pub discovery_mode: DiscoveryMode,
    /// 启动结束时立即实例化带 `Eager` 标记的单例和应用作用域 Bean
    pub eager_singletons: bool,
    /// 记录生命周期状态转换
    pub log_lifecycle_transitions: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            enable_circular_dependency_detection: true,
            max_resolution_depth: 100,
            enable_validation: true,
            discovery_mode: DiscoveryMode::default(),
            eager_singletons: true,
            log_lifecycle_transitions: false,
        }
    }
}

impl ContainerConfig {
    /// 设置发现模式
    pub fn with_discovery_mode(mut self, mode: DiscoveryMode) -> Self {
        self.discovery_mode = mode;
        self
    }

    /// 设置最大解析深度
    pub fn with_max_resolution_depth(mut self, depth: usize) -> Self {
        self.max_resolution_depth = depth;
        self
    }

    /// 设置是否启用部署验证
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = enabled;
        self
    }

    /// 设置是否立即实例化单例
    pub fn with_eager_singletons(mut self, enabled: bool) -> Self {
        self.eager_singletons = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ContainerConfig =
            serde_json::from_str(r#"{"discovery_mode":"all","max_resolution_depth":8}"#).unwrap();
        assert_eq!(config.discovery_mode, DiscoveryMode::All);
        assert_eq!(config.max_resolution_depth, 8);
        assert!(config.enable_validation);
    }
}

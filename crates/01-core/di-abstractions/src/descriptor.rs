//! Bean 描述文件模型
//!
//! 描述文件由外部解析（通常是设置文件中的 `beans` 节），容器只消费解析后的
//! 启用列表、排除过滤器和发现模式。

use di_common::DiscoveryMode;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Bean 描述
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeansDescriptor {
    /// 发现模式，未设置时使用容器配置
    pub discovery_mode: Option<DiscoveryMode>,
    /// 启用的备选类型或备选构造型，按名称
    pub alternatives: Vec<String>,
    /// 按顺序启用的拦截器
    pub interceptors: Vec<String>,
    /// 按顺序启用的装饰器
    pub decorators: Vec<String>,
    /// 默认拦截器，应用于所有 Bean
    pub default_interceptors: Vec<String>,
    /// 排除过滤器
    pub excludes: Vec<ExcludeFilter>,
    /// 去掉没有 Bean 定义标记、生产者或观察者的类型
    pub trim: bool,
}

impl BeansDescriptor {
    /// 创建空描述
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置发现模式
    pub fn with_discovery_mode(mut self, mode: DiscoveryMode) -> Self {
        self.discovery_mode = Some(mode);
        self
    }

    /// 启用备选
    pub fn enable_alternative(mut self, name: impl Into<String>) -> Self {
        self.alternatives.push(name.into());
        self
    }

    /// 启用拦截器
    pub fn enable_interceptor(mut self, name: impl Into<String>) -> Self {
        self.interceptors.push(name.into());
        self
    }

    /// 启用装饰器
    pub fn enable_decorator(mut self, name: impl Into<String>) -> Self {
        self.decorators.push(name.into());
        self
    }

    /// 添加默认拦截器
    pub fn default_interceptor(mut self, name: impl Into<String>) -> Self {
        self.default_interceptors.push(name.into());
        self
    }

    /// 添加排除过滤器
    pub fn exclude(mut self, filter: ExcludeFilter) -> Self {
        self.excludes.push(filter);
        self
    }

    /// 设置是否裁剪
    pub fn with_trim(mut self, trim: bool) -> Self {
        self.trim = trim;
        self
    }

    /// 检查类型是否被排除
    pub fn is_excluded(&self, type_name: &str, env: &dyn DescriptorEnvironment) -> bool {
        self.excludes
            .iter()
            .any(|filter| filter.matches(type_name) && filter.is_active(env))
    }
}

/// 名称匹配方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamePattern {
    /// 完整类型名称
    Exact(String),
    /// 模块中的直接成员（`a::b::*`）
    Package(String),
    /// 模块及其子模块中的成员（`a::b::**`）
    PackageTree(String),
}

impl NamePattern {
    /// 解析名称，`.` 和 `::` 都可以作为分隔符
    pub fn parse(name: &str) -> Self {
        let normalized = normalize(name.trim());
        if let Some(prefix) = normalized.strip_suffix("::**") {
            Self::PackageTree(prefix.to_string())
        } else if let Some(prefix) = normalized.strip_suffix("::*") {
            Self::Package(prefix.to_string())
        } else {
            Self::Exact(normalized)
        }
    }

    /// 检查类型名称是否匹配
    pub fn matches(&self, type_name: &str) -> bool {
        let type_name = strip_generics(type_name);
        match self {
            Self::Exact(name) => {
                type_name == name || type_name.rsplit("::").next() == Some(name.as_str())
            }
            Self::Package(prefix) => module_path(type_name) == Some(prefix.as_str()),
            Self::PackageTree(prefix) => type_name.starts_with(&format!("{}::", prefix)),
        }
    }
}

fn normalize(name: &str) -> String {
    if name.contains("::") {
        name.to_string()
    } else {
        name.replace('.', "::")
    }
}

fn strip_generics(type_name: &str) -> &str {
    let name = type_name.trim_start_matches("dyn ");
    name.split('<').next().unwrap_or(name)
}

fn module_path(type_name: &str) -> Option<&str> {
    type_name.rsplit_once("::").map(|(module, _)| module)
}

/// 排除过滤器
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludeFilter {
    /// 名称：`a::b::Type`、`a::b::*` 或 `a::b::**`
    pub name: String,
    /// 所有条件都满足时过滤器才生效
    #[serde(default)]
    pub conditions: Vec<ExcludeCondition>,
}

impl ExcludeFilter {
    /// 创建无条件的排除过滤器
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conditions: Vec::new(),
        }
    }

    /// 添加条件
    pub fn when(mut self, condition: ExcludeCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// 名称匹配方式
    pub fn pattern(&self) -> NamePattern {
        NamePattern::parse(&self.name)
    }

    /// 检查类型名称是否匹配
    pub fn matches(&self, type_name: &str) -> bool {
        self.pattern().matches(type_name)
    }

    /// 检查所有条件是否满足
    pub fn is_active(&self, env: &dyn DescriptorEnvironment) -> bool {
        self.conditions.iter().all(|condition| condition.holds(env))
    }
}

/// 排除条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExcludeCondition {
    /// 指定类型可用时
    IfClassAvailable {
        /// 类型名称
        name: String,
    },
    /// 指定类型不可用时
    IfClassNotAvailable {
        /// 类型名称
        name: String,
    },
    /// 系统属性存在（并且等于指定值）时
    IfSystemProperty {
        /// 属性名称
        name: String,
        /// 期望值
        #[serde(default)]
        value: Option<String>,
    },
}

impl ExcludeCondition {
    /// 检查条件是否满足
    pub fn holds(&self, env: &dyn DescriptorEnvironment) -> bool {
        match self {
            Self::IfClassAvailable { name } => env.is_class_available(name),
            Self::IfClassNotAvailable { name } => !env.is_class_available(name),
            Self::IfSystemProperty { name, value } => match (env.system_property(name), value) {
                (Some(actual), Some(expected)) => actual == *expected,
                (Some(_), None) => true,
                (None, _) => false,
            },
        }
    }
}

/// 排除条件的求值环境
pub trait DescriptorEnvironment {
    /// 类型是否可用
    fn is_class_available(&self, name: &str) -> bool;

    /// 读取系统属性
    fn system_property(&self, name: &str) -> Option<String>;
}

/// 基于已发现类型和属性表的求值环境
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment {
    available: HashSet<String>,
    properties: HashMap<String, String>,
}

impl StaticEnvironment {
    /// 创建求值环境
    pub fn new(available: impl IntoIterator<Item = String>) -> Self {
        Self {
            available: available.into_iter().collect(),
            properties: HashMap::new(),
        }
    }

    /// 使用进程环境变量作为系统属性
    pub fn with_process_properties(mut self) -> Self {
        self.properties.extend(std::env::vars());
        self
    }

    /// 设置属性
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

impl DescriptorEnvironment for StaticEnvironment {
    fn is_class_available(&self, name: &str) -> bool {
        let pattern = NamePattern::parse(name);
        self.available.iter().any(|known| pattern.matches(known))
    }

    fn system_property(&self, name: &str) -> Option<String> {
        self.properties.get(name).cloned()
    }
}

//! 错误类型定义
//!
//! 错误按严重程度分为三类：
//! - 定义错误与部署问题：在发现和验证阶段累积，只在部署验证检查点统一报告
//! - 创建错误：运行时唯一可恢复的错误，只影响一次实例化
//! - 拦截器和业务方法抛出的错误：原样传播，不做转换

use crate::lifecycle::{ContainerPhase, LifecycleState};
use thiserror::Error;

/// 类型擦除后的错误
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 定义错误
///
/// 元数据不合法，在扫描和验证过程中记录，不会在扫描中途抛出
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("类型 {type_name} 声明了冲突的作用域: {scopes:?}")]
    ConflictingScopes {
        type_name: String,
        scopes: Vec<String>,
    },

    #[error("类型 {type_name} 声明了多个注入构造函数")]
    MultipleInjectConstructors { type_name: String },

    #[error("类型 {type_name} 没有可用的构造函数")]
    NoUsableConstructor { type_name: String },

    #[error("生产者成员无效: {type_name}::{member}, 不能同时带有 @{marker}")]
    InvalidProducer {
        type_name: String,
        member: String,
        marker: String,
    },

    #[error("生命周期回调无效: {type_name}::{method}, 原因: {reason}")]
    InvalidLifecycleCallback {
        type_name: String,
        method: String,
        reason: String,
    },

    #[error("拦截器 {type_name} 在同一层级声明了多个 {kind} 处理方法")]
    DuplicateInterceptorMethod { type_name: String, kind: String },

    #[error("拦截器 {type_name} 没有声明任何拦截器绑定")]
    InterceptorWithoutBindings { type_name: String },

    #[error("装饰器 {type_name} 必须有且只有一个委托注入点, 实际为 {count} 个")]
    InvalidDelegate { type_name: String, count: usize },

    #[error("检测到循环构造: {cycle}")]
    CircularConstruction { cycle: String },

    #[error("启用列表中包含未知类型: {type_name}")]
    UnknownEnabledType { type_name: String },

    #[error("标记使用无效: {type_name}, 原因: {message}")]
    InvalidMarker { type_name: String, message: String },

    #[error("扩展报告定义错误: {message}")]
    Extension { message: String },
}

impl DefinitionError {
    /// 创建扩展定义错误
    pub fn extension(message: impl Into<String>) -> Self {
        Self::Extension {
            message: message.into(),
        }
    }
}

/// 解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("无法满足的依赖: {required_type}, 限定符: {qualifiers}")]
    Unsatisfied {
        required_type: String,
        qualifiers: String,
    },

    #[error("依赖解析不明确: {required_type}, 限定符: {qualifiers}, 候选: {candidates:?}")]
    Ambiguous {
        required_type: String,
        qualifiers: String,
        candidates: Vec<String>,
    },
}

impl ResolutionError {
    /// 是否为无法满足的依赖
    pub fn is_unsatisfied(&self) -> bool {
        matches!(self, Self::Unsatisfied { .. })
    }

    /// 是否为不明确的依赖
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Ambiguous { .. })
    }
}

/// 部署问题
#[derive(Error, Debug, Clone)]
pub enum DeploymentProblem {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("注入点 {injection_point} 解析失败: {source}")]
    Resolution {
        injection_point: String,
        #[source]
        source: ResolutionError,
    },

    #[error("扩展报告部署问题: {message}")]
    Extension { message: String },
}

impl DeploymentProblem {
    /// 创建扩展部署问题
    pub fn extension(message: impl Into<String>) -> Self {
        Self::Extension {
            message: message.into(),
        }
    }
}

/// 创建错误
///
/// 运行时创建实例失败，包装底层原因
#[derive(Error, Debug)]
pub enum CreationError {
    #[error("组件构造失败: {type_name}, 原因: {source}")]
    ConstructionFailed {
        type_name: String,
        #[source]
        source: BoxError,
    },

    #[error("依赖注入失败: {type_name}::{member}, 原因: {source}")]
    InjectionFailed {
        type_name: String,
        member: String,
        #[source]
        source: BoxError,
    },

    #[error("生命周期回调失败: {type_name}::{callback}, 原因: {source}")]
    CallbackFailed {
        type_name: String,
        callback: String,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("检测到循环构造: {chain}")]
    CircularConstruction { chain: String },

    #[error("作用域上下文未激活: {scope}")]
    ContextNotActive { scope: String },

    #[error("未知作用域: {scope}")]
    UnknownScope { scope: String },

    #[error("并发创建失败: {type_name}, 原因: {message}")]
    ConcurrentCreationFailed { type_name: String, message: String },

    #[error("类型不匹配: 期望 {expected}, 实际 {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("非法的生命周期状态转换: {type_name} {from} -> {to}")]
    IllegalTransition {
        type_name: String,
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("解析深度超过限制: {depth}")]
    DepthExceeded { depth: usize },

    #[error("容器已释放")]
    ContainerDropped,

    #[error("实例已销毁: {type_name}")]
    InstanceDestroyed { type_name: String },
}

impl CreationError {
    /// 创建构造失败错误
    pub fn construction_failed(type_name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::ConstructionFailed {
            type_name: type_name.into(),
            source: source.into(),
        }
    }

    /// 创建类型不匹配错误
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// 事件错误
#[derive(Error, Debug)]
pub enum EventError {
    #[error("观察者执行失败: {observer}, 原因: {source}")]
    ObserverFailed {
        observer: String,
        #[source]
        source: BoxError,
    },

    #[error("异步事件投递失败: {} 个观察者出错", .failures.len())]
    AsyncDeliveryFailed { failures: Vec<EventError> },

    #[error("观察者所属 Bean 不可用: {observer}, 原因: {source}")]
    ObserverBeanUnavailable {
        observer: String,
        #[source]
        source: CreationError,
    },
}

/// 调用错误
///
/// 拦截器链和构造参数访问过程中的协议错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    #[error("参数索引越界: {index}, 参数个数: {len}")]
    ParameterOutOfRange { index: usize, len: usize },

    #[error("参数类型不匹配: 索引 {index}, 期望 {expected}")]
    ParameterTypeMismatch { index: usize, expected: String },

    #[error("参数已被取走: 索引 {index}")]
    ParameterTaken { index: usize },

    #[error("返回值类型不匹配: {method}, 期望 {expected}")]
    ReturnTypeMismatch { method: String, expected: String },

    #[error("调用目标不可用: {method}")]
    TargetUnavailable { method: String },

    #[error("调用终点不可重入: {method}")]
    TerminalReentered { method: String },

    #[error("目标已构造，不能再次构造: {method}")]
    AlreadyConstructed { method: String },
}

/// 组件错误类型
#[derive(Error, Debug)]
pub enum ComponentError {
    #[error("组件扫描失败: {message}")]
    ScanError { message: String },

    #[error("组件发现失败: {message}")]
    DiscoveryError { message: String },

    #[error("容器启动失败: {message}")]
    BootstrapFailed { message: String },

    #[error("配置加载失败: {message}")]
    Configuration { message: String },
}

impl ComponentError {
    /// 创建扫描错误
    pub fn scan_error(message: impl Into<String>) -> Self {
        Self::ScanError {
            message: message.into(),
        }
    }

    /// 创建发现错误
    pub fn discovery_error(message: impl Into<String>) -> Self {
        Self::DiscoveryError {
            message: message.into(),
        }
    }

    /// 创建启动失败错误
    pub fn bootstrap_failed(message: impl Into<String>) -> Self {
        Self::BootstrapFailed {
            message: message.into(),
        }
    }

    /// 创建配置错误
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// 容器错误
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("容器阶段错误: {operation} 需要 {required} 阶段, 当前为 {current}")]
    PhaseViolation {
        operation: String,
        required: ContainerPhase,
        current: ContainerPhase,
    },

    #[error("部署失败, 共 {} 个问题", .problems.len())]
    DeploymentFailed { problems: Vec<DeploymentProblem> },

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Creation(#[from] CreationError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Component(#[from] ComponentError),
}

impl ContainerError {
    /// 部署问题列表，非部署失败时为空
    pub fn problems(&self) -> &[DeploymentProblem] {
        match self {
            Self::DeploymentFailed { problems } => problems,
            _ => &[],
        }
    }
}

/// 容器操作结果
pub type ContainerResult<T> = Result<T, ContainerError>;

/// 实例创建结果
pub type CreationResult<T> = Result<T, CreationError>;

/// 事件投递结果
pub type EventResult<T> = Result<T, EventError>;

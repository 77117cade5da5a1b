//! Bean 实例生命周期与容器启动阶段

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bean 实例生命周期状态
///
/// 状态只能沿固定顺序前进：
/// `Uncreated → Constructed → FieldsInjected → MethodsInjected → PostConstructed
/// → InUse → PreDestroyed → Destroyed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LifecycleState {
    /// 尚未创建
    Uncreated,
    /// 构造函数已执行
    Constructed,
    /// 字段已注入
    FieldsInjected,
    /// 初始化方法已调用
    MethodsInjected,
    /// 初始化回调已执行
    PostConstructed,
    /// 已发布到上下文，可被使用
    InUse,
    /// 销毁回调已执行
    PreDestroyed,
    /// 已销毁
    Destroyed,
}

impl LifecycleState {
    /// 状态机中的下一个状态
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Uncreated => Some(Self::Constructed),
            Self::Constructed => Some(Self::FieldsInjected),
            Self::FieldsInjected => Some(Self::MethodsInjected),
            Self::MethodsInjected => Some(Self::PostConstructed),
            Self::PostConstructed => Some(Self::InUse),
            Self::InUse => Some(Self::PreDestroyed),
            Self::PreDestroyed => Some(Self::Destroyed),
            Self::Destroyed => None,
        }
    }

    /// 检查是否允许转换到目标状态
    pub fn can_transition_to(&self, target: Self) -> bool {
        self.next() == Some(target)
    }

    /// 实例是否仍然可用
    pub fn is_alive(&self) -> bool {
        matches!(self, Self::InUse)
    }
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::Uncreated
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uncreated => "UNCREATED",
            Self::Constructed => "CONSTRUCTED",
            Self::FieldsInjected => "FIELDS_INJECTED",
            Self::MethodsInjected => "METHODS_INJECTED",
            Self::PostConstructed => "POST_CONSTRUCTED",
            Self::InUse => "IN_USE",
            Self::PreDestroyed => "PRE_DESTROYED",
            Self::Destroyed => "DESTROYED",
        };
        f.write_str(name)
    }
}

/// 容器启动阶段
///
/// 启动过程是严格顺序执行的流水线，每个阶段都是同步屏障
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContainerPhase {
    /// 类型发现之前
    BeforeDiscovery,
    /// 类型发现中
    TypeDiscovery,
    /// 类型发现完成
    AfterTypeDiscovery,
    /// Bean 发现中
    BeanDiscovery,
    /// Bean 发现完成，可以开始解析
    AfterBeanDiscovery,
    /// 部署验证中
    Validation,
    /// 部署验证完成
    AfterDeploymentValidation,
    /// 运行中
    Running,
    /// 正在关闭
    ShuttingDown,
    /// 已关闭
    Shutdown,
}

impl ContainerPhase {
    /// 是否已到达（或越过）指定阶段
    pub fn is_at_least(&self, phase: Self) -> bool {
        *self >= phase
    }

    /// 是否可以进行解析
    pub fn allows_resolution(&self) -> bool {
        self.is_at_least(Self::AfterBeanDiscovery) && *self < Self::Shutdown
    }
}

impl Default for ContainerPhase {
    fn default() -> Self {
        Self::BeforeDiscovery
    }
}

impl fmt::Display for ContainerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BeforeDiscovery => "BeforeDiscovery",
            Self::TypeDiscovery => "TypeDiscovery",
            Self::AfterTypeDiscovery => "AfterTypeDiscovery",
            Self::BeanDiscovery => "BeanDiscovery",
            Self::AfterBeanDiscovery => "AfterBeanDiscovery",
            Self::Validation => "Validation",
            Self::AfterDeploymentValidation => "AfterDeploymentValidation",
            Self::Running => "Running",
            Self::ShuttingDown => "ShuttingDown",
            Self::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

//! # DI Common
//!
//! 这个 crate 提供了 Lorn Weave 容器各层共享的基础类型。
//!
//! ## 核心类型
//!
//! - [`Marker`] - 声明式标记（限定符、作用域、拦截器绑定、构造型等）
//! - [`MarkerDefinition`] - 标记类型的声明（元标记、非绑定成员）
//! - [`TypeKey`] - 类型闭包中的类型标识
//! - [`LifecycleState`] - Bean 实例生命周期状态机
//! - [`ContainerPhase`] - 容器启动阶段
//! - [`ContainerConfig`] - 容器配置
//!
//! ## 设计原则
//!
//! - 标记是纯数据，语义由注册表解释
//! - 错误按严重程度分类：定义错误、部署错误、创建错误

pub mod configuration;
pub mod errors;
pub mod lifecycle;
pub mod markers;
pub mod types;

pub use configuration::*;
pub use errors::*;
pub use lifecycle::*;
pub use markers::*;
pub use types::*;

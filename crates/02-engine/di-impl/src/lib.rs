//! # DI Impl
//!
//! Lorn Weave 容器引擎：元数据注册、类型安全解析、实例生命周期、拦截器链和事件分发。
//!
//! ## 核心组件
//!
//! - [`MetadataRegistry`] - 类型注册与分类
//! - [`Resolver`] - 按类型、限定符和名称解析 Bean
//! - [`LifecycleEngine`] - 创建、注入、缓存和销毁实例
//! - [`InterceptionHandler`] - 构建并执行拦截器链
//! - [`EventDispatcher`] - 观察者解析与事件投递
//! - [`Container`] - 驱动启动流水线并对外提供查找接口
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let container = Container::builder()
//!     .add_type(greeter_type())
//!     .build()?;
//! let greeter = container.select::<dyn Greeter>(&[])?;
//! ```

pub mod bean;
pub mod container;
pub mod contexts;
pub mod events;
pub mod extension;
pub mod interception;
pub mod lifecycle;
pub mod problems;
pub mod registry;
pub mod resolution;

mod validation;

pub use bean::{Bean, ConstructionStrategy, InjectionPoint, MemberKind, SyntheticBean};
pub use container::{Container, ContainerBuilder, ContainerStats};
pub use contexts::{InstanceStore, RequestContext, RequestContextGuard, SingletonContext};
pub use events::{EventDispatcher, ObserverInstances, ObserverMethod};
pub use extension::{
    AfterBeanDiscovery, AfterDeploymentValidation, AfterTypeDiscovery, BeforeBeanDiscovery,
    BeforeShutdown, Extension, ProcessType,
};
pub use interception::{InterceptionHandler, InterceptorChain, InterceptorProvider};
pub use lifecycle::{LifecycleEngine, ManagedInstance, ResolutionContext};
pub use problems::ProblemCollector;
pub use registry::{
    BeanFacts, Classification, MarkerTypeRegistry, MetadataRegistry, TypeDescriptor, TypeRole,
};
pub use resolution::{Enablement, ResolvedInterceptor, Resolver};

//! # DI Abstractions
//!
//! 容器与外部协作者之间的抽象层。
//!
//! ## 核心接口
//!
//! - [`AnnotatedType`] - 类型能力查询接口，[`ComponentType`] 为构建器实现
//! - [`TypeBinding`] - 类型闭包条目
//! - [`InvocationContext`] - 拦截器链调用上下文
//! - [`Intercepted`] - 被拦截实例的调用句柄
//! - [`Context`] - 作用域上下文
//! - [`Event`] - 可触发的事件
//! - [`TypeScanner`] - 类型扫描器
//! - [`BeansDescriptor`] - Bean 描述

pub mod annotated;
pub mod binding;
pub mod context;
pub mod dependency;
pub mod descriptor;
pub mod event;
pub mod intercepted;
pub mod invocation;
pub mod members;
pub mod scanner;

pub use annotated::*;
pub use binding::*;
pub use context::*;
pub use dependency::*;
pub use descriptor::*;
pub use event::*;
pub use intercepted::*;
pub use invocation::*;
pub use members::*;
pub use scanner::*;

pub use di_common::{BoxError, BoxedValue, Marker, SharedInstance, TypeKey};

//! 拦截调用上下文
//!
//! 拦截器链由有序的链接和一个调用终点组成。[`InvocationContext::proceed`]
//! 是唯一的推进原语：在位置 `i` 调用时执行第 `i` 个链接的处理方法，链接
//! 返回后游标恢复，因此拦截器可以调用 `proceed` 零次、一次或多次。

use di_common::{BoxError, BoxedValue, InvocationError, SharedInstance};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 调用结果
///
/// 链接抛出的错误原样传播，可以向下转换为原始错误类型
pub type InvocationResult = Result<BoxedValue, BoxError>;

/// 拦截器处理方法
pub type InterceptorHandler =
    Arc<dyn Fn(&(dyn Any + Send + Sync), &mut InvocationContext<'_>) -> InvocationResult + Send + Sync>;

/// 调用终点
pub type Terminal<'a> = Box<dyn FnMut(&mut InvocationContext<'_>) -> InvocationResult + 'a>;

/// 把闭包包装为拦截器处理方法
pub fn handler<F>(f: F) -> InterceptorHandler
where
    F: Fn(&(dyn Any + Send + Sync), &mut InvocationContext<'_>) -> InvocationResult
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// 把闭包包装为调用终点
pub fn terminal<'a, F>(f: F) -> Terminal<'a>
where
    F: FnMut(&mut InvocationContext<'_>) -> InvocationResult + 'a,
{
    Box::new(f)
}

/// 拦截类型，每次调用只有一种处理方法生效
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterceptionKind {
    /// 业务方法调用
    AroundInvoke,
    /// 定时方法调用
    AroundTimeout,
    /// 构造函数调用
    AroundConstruct,
    /// 初始化回调
    PostConstruct,
    /// 销毁回调
    PreDestroy,
}

impl InterceptionKind {
    /// 是否为生命周期回调拦截
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::AroundConstruct | Self::PostConstruct | Self::PreDestroy
        )
    }
}

impl fmt::Display for InterceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AroundInvoke => "AroundInvoke",
            Self::AroundTimeout => "AroundTimeout",
            Self::AroundConstruct => "AroundConstruct",
            Self::PostConstruct => "PostConstruct",
            Self::PreDestroy => "PreDestroy",
        };
        f.write_str(name)
    }
}

/// 拦截器链中的一个链接
#[derive(Clone)]
pub struct Link {
    name: String,
    instance: SharedInstance,
    handler: InterceptorHandler,
}

impl Link {
    /// 创建链接
    pub fn new(name: impl Into<String>, instance: SharedInstance, handler: InterceptorHandler) -> Self {
        Self {
            name: name.into(),
            instance,
            handler,
        }
    }

    /// 链接名称（拦截器类型名和方法名）
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link").field("name", &self.name).finish()
    }
}

/// 调用目标
pub enum InvocationTarget<'a> {
    /// 尚无目标（构造函数拦截在终点执行前）
    Empty,
    /// 构造完成但尚未发布的实例
    Owned(BoxedValue),
    /// 初始化阶段可变借用的实例
    Exclusive(&'a mut (dyn Any + Send + Sync)),
    /// 已发布的共享实例
    Shared(SharedInstance),
}

impl InvocationTarget<'_> {
    fn as_any(&self) -> Option<&(dyn Any + Send + Sync)> {
        match self {
            Self::Empty => None,
            Self::Owned(value) => Some(&**value),
            Self::Exclusive(value) => Some(&**value),
            Self::Shared(value) => Some(&**value),
        }
    }

    fn as_any_mut(&mut self) -> Option<&mut (dyn Any + Send + Sync)> {
        match self {
            Self::Owned(value) => Some(&mut **value),
            Self::Exclusive(value) => Some(&mut **value),
            Self::Empty | Self::Shared(_) => None,
        }
    }
}

/// 拦截调用上下文
pub struct InvocationContext<'a> {
    kind: InterceptionKind,
    method: String,
    target: InvocationTarget<'a>,
    parameters: Vec<BoxedValue>,
    data: HashMap<String, BoxedValue>,
    links: Arc<[Link]>,
    position: usize,
    terminal: Option<Terminal<'a>>,
}

impl<'a> InvocationContext<'a> {
    /// 创建调用上下文
    pub fn new(
        kind: InterceptionKind,
        method: impl Into<String>,
        target: InvocationTarget<'a>,
        parameters: Vec<BoxedValue>,
        links: Arc<[Link]>,
        terminal: Terminal<'a>,
    ) -> Self {
        Self {
            kind,
            method: method.into(),
            target,
            parameters,
            data: HashMap::new(),
            links,
            position: 0,
            terminal: Some(terminal),
        }
    }

    /// 推进到下一个链接；越过所有链接后执行调用终点
    pub fn proceed(&mut self) -> InvocationResult {
        let position = self.position;
        if position < self.links.len() {
            let links = Arc::clone(&self.links);
            let link = &links[position];
            self.position = position + 1;
            let result = (link.handler)(&*link.instance, self);
            self.position = position;
            return result;
        }

        let mut terminal = self.terminal.take().ok_or_else(|| {
            Box::new(InvocationError::TerminalReentered {
                method: self.method.clone(),
            }) as BoxError
        })?;
        let result = terminal(self);
        self.terminal = Some(terminal);
        result
    }

    /// 拦截类型
    pub fn kind(&self) -> InterceptionKind {
        self.kind
    }

    /// 被拦截的方法名称
    pub fn method(&self) -> &str {
        &self.method
    }

    /// 当前游标位置
    pub fn position(&self) -> usize {
        self.position
    }

    /// 链接个数
    pub fn chain_len(&self) -> usize {
        self.links.len()
    }

    /// 获取调用目标
    pub fn target<C: Any>(&self) -> Option<&C> {
        self.target.as_any().and_then(|target| target.downcast_ref::<C>())
    }

    /// 获取可变调用目标，仅在构造和初始化阶段可用
    pub fn target_mut<C: Any>(&mut self) -> Option<&mut C> {
        self.target
            .as_any_mut()
            .and_then(|target| target.downcast_mut::<C>())
    }

    /// 类型擦除的调用目标
    pub fn target_any(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.target.as_any()
    }

    /// 类型擦除的可变调用目标
    pub fn target_any_mut(&mut self) -> Option<&mut (dyn Any + Send + Sync)> {
        self.target.as_any_mut()
    }

    /// 设置调用目标（构造函数拦截的终点使用）
    pub fn set_target(&mut self, target: InvocationTarget<'a>) {
        self.target = target;
    }

    /// 取出调用目标
    pub fn take_target(&mut self) -> InvocationTarget<'a> {
        std::mem::replace(&mut self.target, InvocationTarget::Empty)
    }

    /// 所有参数
    pub fn parameters(&self) -> &[BoxedValue] {
        &self.parameters
    }

    /// 可变参数列表
    pub fn parameters_mut(&mut self) -> &mut Vec<BoxedValue> {
        &mut self.parameters
    }

    /// 获取指定参数
    pub fn parameter<T: Any>(&self, index: usize) -> Result<&T, InvocationError> {
        let value = self
            .parameters
            .get(index)
            .ok_or(InvocationError::ParameterOutOfRange {
                index,
                len: self.parameters.len(),
            })?;
        value
            .downcast_ref::<T>()
            .ok_or_else(|| InvocationError::ParameterTypeMismatch {
                index,
                expected: std::any::type_name::<T>().to_string(),
            })
    }

    /// 替换指定参数
    pub fn set_parameter<T: Any + Send + Sync>(
        &mut self,
        index: usize,
        value: T,
    ) -> Result<(), InvocationError> {
        let len = self.parameters.len();
        let slot = self
            .parameters
            .get_mut(index)
            .ok_or(InvocationError::ParameterOutOfRange { index, len })?;
        *slot = Box::new(value);
        Ok(())
    }

    /// 取出所有参数，调用终点消费参数时使用
    pub fn take_parameters(&mut self) -> Vec<BoxedValue> {
        std::mem::take(&mut self.parameters)
    }

    /// 上下文数据，所有链接共享
    pub fn context_data(&self) -> &HashMap<String, BoxedValue> {
        &self.data
    }

    /// 写入上下文数据
    pub fn put_data<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.data.insert(key.into(), Box::new(value));
    }

    /// 读取上下文数据
    pub fn data<T: Any>(&self, key: &str) -> Option<&T> {
        self.data.get(key).and_then(|value| value.downcast_ref::<T>())
    }
}

impl fmt::Debug for InvocationContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("kind", &self.kind)
            .field("method", &self.method)
            .field("position", &self.position)
            .field("links", &self.links)
            .finish()
    }
}

/// 业务方法调用器
///
/// 由容器为每个被拦截的实例创建，缓存该实例每个方法的拦截器链
pub trait BusinessMethodInvoker: Send + Sync {
    /// 通过拦截器链调用业务方法
    fn invoke(
        &self,
        target: &SharedInstance,
        kind: InterceptionKind,
        method: &str,
        parameters: Vec<BoxedValue>,
        terminal: Terminal<'_>,
    ) -> InvocationResult;
}

/// 把一组值装箱为调用参数
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::BoxedValue>::new()
    };
    ($($value:expr),+ $(,)?) => {
        vec![$(::std::boxed::Box::new($value) as $crate::BoxedValue),+]
    };
}

//! 被拦截实例的调用句柄

use crate::invocation::{terminal, BusinessMethodInvoker, InterceptionKind, InvocationContext};
use di_common::{BoxError, BoxedValue, InvocationError, SharedInstance};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 被拦截的实例
///
/// 代理工厂收到该句柄后构造实现能力 trait 的包装类型，包装类型的每个方法
/// 通过 [`Intercepted::invoke`] 进入拦截器链
pub struct Intercepted<C> {
    target: Arc<C>,
    raw: SharedInstance,
    invoker: Arc<dyn BusinessMethodInvoker>,
}

impl<C: Send + Sync + 'static> Intercepted<C> {
    /// 创建调用句柄
    pub fn new(target: Arc<C>, invoker: Arc<dyn BusinessMethodInvoker>) -> Self {
        let raw: SharedInstance = target.clone();
        Self {
            target,
            raw,
            invoker,
        }
    }

    /// 被拦截的原始实例
    pub fn target(&self) -> &Arc<C> {
        &self.target
    }

    /// 通过拦截器链调用业务方法
    ///
    /// `call` 是调用终点，接收目标实例和（可能被拦截器修改过的）参数
    pub fn invoke<R, F>(&self, method: &str, parameters: Vec<BoxedValue>, call: F) -> Result<R, BoxError>
    where
        R: Any + Send + Sync,
        F: FnMut(&C, &InvocationContext<'_>) -> Result<R, BoxError>,
    {
        self.dispatch(InterceptionKind::AroundInvoke, method, parameters, call)
    }

    /// 通过拦截器链调用定时方法
    pub fn invoke_timeout<R, F>(
        &self,
        method: &str,
        parameters: Vec<BoxedValue>,
        call: F,
    ) -> Result<R, BoxError>
    where
        R: Any + Send + Sync,
        F: FnMut(&C, &InvocationContext<'_>) -> Result<R, BoxError>,
    {
        self.dispatch(InterceptionKind::AroundTimeout, method, parameters, call)
    }

    fn dispatch<R, F>(
        &self,
        kind: InterceptionKind,
        method: &str,
        parameters: Vec<BoxedValue>,
        mut call: F,
    ) -> Result<R, BoxError>
    where
        R: Any + Send + Sync,
        F: FnMut(&C, &InvocationContext<'_>) -> Result<R, BoxError>,
    {
        let target = Arc::clone(&self.target);
        let end = terminal(move |ctx| {
            let value = call(&target, &*ctx)?;
            Ok(Box::new(value) as BoxedValue)
        });
        let result = self
            .invoker
            .invoke(&self.raw, kind, method, parameters, end)?;
        result.downcast::<R>().map(|value| *value).map_err(|_| {
            Box::new(InvocationError::ReturnTypeMismatch {
                method: method.to_string(),
                expected: std::any::type_name::<R>().to_string(),
            }) as BoxError
        })
    }
}

impl<C> Clone for Intercepted<C> {
    fn clone(&self) -> Self {
        Self {
            target: Arc::clone(&self.target),
            raw: Arc::clone(&self.raw),
            invoker: Arc::clone(&self.invoker),
        }
    }
}

impl<C> fmt::Debug for Intercepted<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Intercepted")
            .field("target", &std::any::type_name::<C>())
            .finish()
    }
}

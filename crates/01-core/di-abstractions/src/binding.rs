//! 类型闭包条目
//!
//! 每个条目把容器保存的原始实例转换为某个可请求类型的引用。Rust 没有
//! 运行时子类型，所以实现关系通过每个类型一次的转换函数显式声明。

use crate::intercepted::Intercepted;
use crate::invocation::BusinessMethodInvoker;
use di_common::{BoxedValue, SharedInstance, TypeKey};
use std::fmt;
use std::sync::Arc;

type ViewFn = Arc<dyn Fn(&SharedInstance) -> Option<BoxedValue> + Send + Sync>;
type ProxyFn =
    Arc<dyn Fn(&SharedInstance, Arc<dyn BusinessMethodInvoker>) -> Option<BoxedValue> + Send + Sync>;

/// 类型闭包中的一个类型
///
/// 视图函数返回的值内部为 `Arc<T>`，`T` 即 [`TypeBinding::key`] 对应的类型
#[derive(Clone)]
pub struct TypeBinding {
    key: TypeKey,
    view: ViewFn,
    proxy: Option<ProxyFn>,
}

impl TypeBinding {
    /// 类型自身，原始实例内容为 `C`
    pub fn identity<C: Send + Sync + 'static>() -> Self {
        Self {
            key: TypeKey::of::<C>(),
            view: Arc::new(|raw: &SharedInstance| {
                Arc::clone(raw)
                    .downcast::<C>()
                    .ok()
                    .map(|typed| Box::new(typed) as BoxedValue)
            }),
            proxy: None,
        }
    }

    /// 类型 `C` 实现的另一个类型（通常是 trait object）
    pub fn upcast<C, T>(cast: fn(Arc<C>) -> Arc<T>) -> Self
    where
        C: Send + Sync + 'static,
        T: ?Sized + Send + Sync + 'static,
    {
        Self {
            key: TypeKey::of::<T>(),
            view: Arc::new(move |raw: &SharedInstance| {
                Arc::clone(raw)
                    .downcast::<C>()
                    .ok()
                    .map(|typed| Box::new(cast(typed)) as BoxedValue)
            }),
            proxy: None,
        }
    }

    /// 可被拦截的类型
    ///
    /// 当实例存在业务方法拦截器时，通过 `proxy` 把 [`Intercepted`] 包装为 `T`；
    /// 否则与 [`TypeBinding::upcast`] 相同
    pub fn intercepted<C, T>(cast: fn(Arc<C>) -> Arc<T>, proxy: fn(Intercepted<C>) -> Arc<T>) -> Self
    where
        C: Send + Sync + 'static,
        T: ?Sized + Send + Sync + 'static,
    {
        let mut binding = Self::upcast(cast);
        binding.proxy = Some(Arc::new(
            move |raw: &SharedInstance, invoker: Arc<dyn BusinessMethodInvoker>| {
                let target = Arc::clone(raw).downcast::<C>().ok()?;
                let wrapped = proxy(Intercepted::new(target, invoker));
                Some(Box::new(wrapped) as BoxedValue)
            },
        ));
        binding
    }

    /// 通用类型，视图内容为原始实例本身
    pub fn object() -> Self {
        Self {
            key: TypeKey::object(),
            view: Arc::new(|raw: &SharedInstance| Some(Box::new(Arc::clone(raw)) as BoxedValue)),
            proxy: None,
        }
    }

    /// 生产者产出的类型，原始实例内容为 `Arc<P>`
    pub fn product<P: ?Sized + Send + Sync + 'static>() -> Self {
        Self {
            key: TypeKey::of::<P>(),
            view: Arc::new(|raw: &SharedInstance| {
                raw.downcast_ref::<Arc<P>>()
                    .map(|product| Box::new(Arc::clone(product)) as BoxedValue)
            }),
            proxy: None,
        }
    }

    /// 生产者产出类型实现的另一个类型
    pub fn product_as<P, T>(cast: fn(Arc<P>) -> Arc<T>) -> Self
    where
        P: ?Sized + Send + Sync + 'static,
        T: ?Sized + Send + Sync + 'static,
    {
        Self {
            key: TypeKey::of::<T>(),
            view: Arc::new(move |raw: &SharedInstance| {
                raw.downcast_ref::<Arc<P>>()
                    .map(|product| Box::new(cast(Arc::clone(product))) as BoxedValue)
            }),
            proxy: None,
        }
    }

    /// 类型标识
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// 获取未拦截的引用
    pub fn view(&self, raw: &SharedInstance) -> Option<BoxedValue> {
        (self.view)(raw)
    }

    /// 获取经过拦截的引用；不支持拦截时返回 `None`
    pub fn proxy(
        &self,
        raw: &SharedInstance,
        invoker: Arc<dyn BusinessMethodInvoker>,
    ) -> Option<BoxedValue> {
        self.proxy.as_ref().and_then(|proxy| proxy(raw, invoker))
    }

    /// 是否支持拦截
    pub fn is_interceptable(&self) -> bool {
        self.proxy.is_some()
    }
}

impl fmt::Debug for TypeBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeBinding")
            .field("key", &self.key)
            .field("interceptable", &self.is_interceptable())
            .finish()
    }
}

/// 从视图值中取出 `Arc<T>`
pub fn unbox_reference<T: ?Sized + Send + Sync + 'static>(value: BoxedValue) -> Option<Arc<T>> {
    value.downcast::<Arc<T>>().ok().map(|typed| *typed)
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Named: Send + Sync {
        fn name(&self) -> String;
    }

    struct Plain;

    impl Named for Plain {
        fn name(&self) -> String {
            "plain".to_string()
        }
    }

    #[test]
    fn test_upcast_view() {
        let raw: SharedInstance = Arc::new(Plain);
        let binding = TypeBinding::upcast::<Plain, dyn Named>(|plain| plain);
        let named = unbox_reference::<dyn Named>(binding.view(&raw).unwrap()).unwrap();
        assert_eq!(named.name(), "plain");
        assert_eq!(binding.key(), TypeKey::of::<dyn Named>());
    }

    #[test]
    fn test_product_view() {
        let product: Arc<dyn Named> = Arc::new(Plain);
        let raw: SharedInstance = Arc::new(product);
        let binding = TypeBinding::product::<dyn Named>();
        assert!(unbox_reference::<dyn Named>(binding.view(&raw).unwrap()).is_some());
        assert!(TypeBinding::identity::<Plain>().view(&raw).is_none());
    }

    #[test]
    fn test_object_view_returns_raw() {
        let raw: SharedInstance = Arc::new(Plain);
        let object = unbox_reference::<dyn std::any::Any + Send + Sync>(
            TypeBinding::object().view(&raw).unwrap(),
        )
        .unwrap();
        assert!(Arc::ptr_eq(&object, &raw));
    }
}

//! 注入点依赖声明、解析参数和延迟引用

use crate::binding::unbox_reference;
use di_common::{BoxedValue, CreationError, CreationResult, InvocationError, Marker, TypeKey};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 延迟引用的解析函数，返回值内部为 `Arc<T>`
pub type LazyResolver = Arc<dyn Fn() -> CreationResult<BoxedValue> + Send + Sync>;

type LazyWrapper = Arc<dyn Fn(LazyResolver) -> BoxedValue + Send + Sync>;

/// 注入点依赖声明
#[derive(Clone)]
pub struct Dependency {
    key: TypeKey,
    qualifiers: Vec<Marker>,
    lazy: Option<LazyWrapper>,
    delegate: bool,
}

impl Dependency {
    /// 依赖类型 `T`，注入值为 `Arc<T>`
    pub fn of<T: ?Sized + Send + Sync + 'static>() -> Self {
        Self {
            key: TypeKey::of::<T>(),
            qualifiers: Vec::new(),
            lazy: None,
            delegate: false,
        }
    }

    /// 延迟依赖，注入值为 [`Lazy<T>`]，首次使用时才解析
    pub fn lazy<T: ?Sized + Send + Sync + 'static>() -> Self {
        Self {
            lazy: Some(Arc::new(|resolver: LazyResolver| {
                Box::new(Lazy::<T>::new(resolver)) as BoxedValue
            })),
            ..Self::of::<T>()
        }
    }

    /// 添加限定符
    pub fn qualified(mut self, qualifier: Marker) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    /// 标记为装饰器委托注入点
    pub fn delegate(mut self) -> Self {
        self.delegate = true;
        self
    }

    /// 依赖类型
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// 声明的限定符
    pub fn qualifiers(&self) -> &[Marker] {
        &self.qualifiers
    }

    /// 是否为延迟依赖
    pub fn is_lazy(&self) -> bool {
        self.lazy.is_some()
    }

    /// 是否为委托注入点
    pub fn is_delegate(&self) -> bool {
        self.delegate
    }

    /// 用解析函数构造延迟引用；非延迟依赖返回 `None`
    pub fn wrap_lazy(&self, resolver: LazyResolver) -> Option<BoxedValue> {
        self.lazy.as_ref().map(|wrap| wrap(resolver))
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("key", &self.key)
            .field("qualifiers", &self.qualifiers)
            .field("lazy", &self.is_lazy())
            .field("delegate", &self.delegate)
            .finish()
    }
}

/// 已解析的构造、初始化或生产者参数
#[derive(Default)]
pub struct Arguments {
    values: Vec<Option<BoxedValue>>,
}

impl Arguments {
    /// 创建参数列表
    pub fn new(values: Vec<BoxedValue>) -> Self {
        Self {
            values: values.into_iter().map(Some).collect(),
        }
    }

    /// 参数个数
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 是否没有参数
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn slot(&self, index: usize) -> Result<&BoxedValue, InvocationError> {
        self.values
            .get(index)
            .ok_or(InvocationError::ParameterOutOfRange {
                index,
                len: self.values.len(),
            })?
            .as_ref()
            .ok_or(InvocationError::ParameterTaken { index })
    }

    /// 克隆指定参数
    pub fn get<V: Any + Clone>(&self, index: usize) -> Result<V, InvocationError> {
        self.slot(index)?
            .downcast_ref::<V>()
            .cloned()
            .ok_or_else(|| InvocationError::ParameterTypeMismatch {
                index,
                expected: std::any::type_name::<V>().to_string(),
            })
    }

    /// 获取注入的引用参数
    pub fn reference<T: ?Sized + Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> Result<Arc<T>, InvocationError> {
        self.get::<Arc<T>>(index)
    }

    /// 取出指定参数
    pub fn take<V: Any>(&mut self, index: usize) -> Result<V, InvocationError> {
        let len = self.values.len();
        let slot = self
            .values
            .get_mut(index)
            .ok_or(InvocationError::ParameterOutOfRange { index, len })?;
        let value = slot.take().ok_or(InvocationError::ParameterTaken { index })?;
        match value.downcast::<V>() {
            Ok(typed) => Ok(*typed),
            Err(original) => {
                *slot = Some(original);
                Err(InvocationError::ParameterTypeMismatch {
                    index,
                    expected: std::any::type_name::<V>().to_string(),
                })
            }
        }
    }

    /// 剩余的参数值
    pub fn into_values(self) -> Vec<BoxedValue> {
        self.values.into_iter().flatten().collect()
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments")
            .field("len", &self.values.len())
            .finish()
    }
}

/// 延迟引用
///
/// 首次调用 [`Lazy::get`] 时解析并缓存，多个克隆共享同一个缓存
pub struct Lazy<T: ?Sized> {
    resolver: LazyResolver,
    cell: Arc<OnceCell<Arc<T>>>,
}

impl<T: ?Sized + Send + Sync + 'static> Lazy<T> {
    /// 创建延迟引用
    pub fn new(resolver: LazyResolver) -> Self {
        Self {
            resolver,
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// 获取引用，必要时解析
    pub fn get(&self) -> CreationResult<Arc<T>> {
        self.cell
            .get_or_try_init(|| {
                tracing::trace!("解析延迟引用: {}", std::any::type_name::<T>());
                let value = (self.resolver)()?;
                unbox_reference::<T>(value).ok_or_else(|| {
                    CreationError::type_mismatch(std::any::type_name::<T>(), "unknown")
                })
            })
            .map(Arc::clone)
    }

    /// 是否已经解析
    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T: ?Sized> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self {
            resolver: Arc::clone(&self.resolver),
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("type", &std::any::type_name::<T>())
            .field("resolved", &self.cell.get().is_some())
            .finish()
    }
}

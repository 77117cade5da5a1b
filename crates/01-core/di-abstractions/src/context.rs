//! 作用域上下文抽象

use di_common::{BeanId, BoxedValue, CreationResult, LifecycleState, SharedInstance, TypeKey};
use std::sync::Arc;

/// 上下文中保存的实例句柄
///
/// 句柄持有原始实例、拦截处理器、装饰器链和依赖对象，销毁只执行一次
pub trait InstanceHandle: Send + Sync {
    /// 所属 Bean
    fn bean(&self) -> BeanId;

    /// 原始实例
    fn raw(&self) -> &SharedInstance;

    /// 获取指定类型的引用（经过拦截和装饰），内部为 `Arc<T>`
    fn reference(&self, key: TypeKey) -> Option<BoxedValue>;

    /// 当前生命周期状态
    fn state(&self) -> LifecycleState;

    /// 销毁实例，重复调用不会再次执行销毁回调
    fn destroy(&self);
}

/// 上下文实例
pub type ContextualInstance = Arc<dyn InstanceHandle>;

/// 实例创建函数
pub type InstanceFactory<'a> = &'a mut dyn FnMut() -> CreationResult<ContextualInstance>;

/// 作用域上下文
///
/// 正常作用域中每个 Bean 最多只有一个存活实例；伪作用域 `Dependent`
/// 由容器直接处理，不经过上下文
pub trait Context: Send + Sync {
    /// 作用域标记名称
    fn scope(&self) -> &str;

    /// 是否为正常作用域
    fn is_normal(&self) -> bool {
        true
    }

    /// 上下文当前是否激活
    fn is_active(&self) -> bool;

    /// 获取已存在的实例
    fn get(&self, bean: BeanId) -> Option<ContextualInstance>;

    /// 获取实例，不存在时创建
    ///
    /// 同一个 Bean 的并发首次创建只会执行一次 `create`
    fn get_or_create(
        &self,
        bean: BeanId,
        create: InstanceFactory<'_>,
    ) -> CreationResult<ContextualInstance>;

    /// 移除实例（不销毁）
    fn remove(&self, bean: BeanId) -> Option<ContextualInstance>;

    /// 移除所有实例（不销毁），按创建顺序返回
    fn drain(&self) -> Vec<ContextualInstance>;

    /// 实例个数
    fn len(&self) -> usize;

    /// 是否没有实例
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! 事件分发
//!
//! 事件的类型闭包与观察者的观察类型匹配，观察者的限定符必须是事件限定符
//! （没有限定符时为 `Default`）加上 `Any` 的子集。同步观察者按注册顺序
//! 在触发线程上执行，遇到第一个错误即停止；异步观察者在阻塞线程池上
//! 并行执行，所有错误汇总后返回。

use crate::bean::Bean;
use crate::lifecycle::LifecycleEngine;
use crate::registry::MarkerTypeRegistry;
use di_abstractions::{event_closure, ContextualInstance, Event, ObserverMember, ObserverMode, TypeBinding};
use di_common::{
    BoxedValue, CreationResult, EventError, EventResult, Marker, SharedInstance, TypeKey,
};
use futures::future::join_all;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// 观察者所属 Bean 的实例来源
pub trait ObserverInstances: Send + Sync {
    /// 获取观察者 Bean 的上下文实例
    fn observer_instance(&self, bean: &Arc<Bean>) -> CreationResult<ContextualInstance>;
}

impl ObserverInstances for LifecycleEngine {
    fn observer_instance(&self, bean: &Arc<Bean>) -> CreationResult<ContextualInstance> {
        self.instance(bean)
    }
}

/// 已注册的观察者方法
#[derive(Debug)]
pub struct ObserverMethod {
    member: ObserverMember,
    bean: Option<Arc<Bean>>,
    name: String,
    order: usize,
}

impl ObserverMethod {
    /// 创建观察者方法，`bean` 为空表示以编程方式注册的观察者
    pub fn new(member: ObserverMember, bean: Option<Arc<Bean>>, order: usize) -> Self {
        let name = match &bean {
            Some(bean) => format!("{}::{}", bean.type_name(), member.name()),
            None => member.name().to_string(),
        };
        Self {
            member,
            bean,
            name,
            order,
        }
    }

    /// 观察者名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 观察者成员
    pub fn member(&self) -> &ObserverMember {
        &self.member
    }

    /// 所属 Bean
    pub fn bean(&self) -> Option<&Arc<Bean>> {
        self.bean.as_ref()
    }

    /// 观察的类型
    pub fn observed(&self) -> TypeKey {
        self.member.observed()
    }

    /// 声明的限定符
    pub fn qualifiers(&self) -> &[Marker] {
        self.member.qualifiers()
    }

    /// 是否异步投递
    pub fn is_async(&self) -> bool {
        self.member.mode() == ObserverMode::Async
    }

    /// 注册顺序
    pub fn order(&self) -> usize {
        self.order
    }

    fn deliver(&self, instances: &dyn ObserverInstances, event: BoxedValue) -> EventResult<()> {
        trace!("通知观察者: {}", self.name);
        let bean = match &self.bean {
            Some(bean) if !self.member.is_static() => bean,
            _ => {
                return self.member.notify(None, event).map_err(|source| EventError::ObserverFailed {
                    observer: self.name.clone(),
                    source,
                })
            }
        };

        let instance = instances
            .observer_instance(bean)
            .map_err(|source| EventError::ObserverBeanUnavailable {
                observer: self.name.clone(),
                source,
            })?;
        let result = self.member.notify(Some(instance.raw()), event);
        if bean.is_dependent() {
            instance.destroy();
        }
        result.map_err(|source| EventError::ObserverFailed {
            observer: self.name.clone(),
            source,
        })
    }
}

/// 事件分发器
pub struct EventDispatcher {
    markers: Arc<MarkerTypeRegistry>,
    observers: RwLock<Vec<Arc<ObserverMethod>>>,
}

impl EventDispatcher {
    /// 创建事件分发器
    pub fn new(markers: Arc<MarkerTypeRegistry>) -> Self {
        Self {
            markers,
            observers: RwLock::new(Vec::new()),
        }
    }

    /// 注册观察者
    pub fn add_observer(&self, member: ObserverMember, bean: Option<Arc<Bean>>) -> Arc<ObserverMethod> {
        let mut observers = self.observers.write();
        let observer = Arc::new(ObserverMethod::new(member, bean, observers.len()));
        debug!(
            "注册观察者: {} (观察类型: {}, 异步: {})",
            observer.name(),
            observer.observed(),
            observer.is_async()
        );
        observers.push(Arc::clone(&observer));
        observer
    }

    /// 所有观察者，按注册顺序
    pub fn observers(&self) -> Vec<Arc<ObserverMethod>> {
        self.observers.read().clone()
    }

    /// 已注册的观察者个数
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// 是否没有观察者
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// 事件会通知到的观察者，同步和异步的都包含
    pub fn resolve_observers<E: Event>(&self, qualifiers: &[Marker]) -> Vec<Arc<ObserverMethod>> {
        let closure = event_closure::<E>();
        self.matching(&closure, qualifiers)
            .into_iter()
            .map(|(observer, _)| observer)
            .collect()
    }

    fn matching<'c>(
        &self,
        closure: &'c [TypeBinding],
        qualifiers: &[Marker],
    ) -> Vec<(Arc<ObserverMethod>, &'c TypeBinding)> {
        let mut event_qualifiers = if qualifiers.is_empty() {
            vec![Marker::default_qualifier()]
        } else {
            qualifiers.to_vec()
        };
        event_qualifiers.push(Marker::any());

        let observers = self.observers.read().clone();
        observers
            .into_iter()
            .filter_map(|observer| {
                let binding = closure.iter().find(|binding| binding.key() == observer.observed())?;
                self.markers
                    .is_subset(observer.qualifiers(), &event_qualifiers)
                    .then_some((observer, binding))
            })
            .collect()
    }

    /// 同步触发事件，返回通知的观察者个数
    ///
    /// 只通知同步观察者；第一个失败的观察者之后的观察者不再执行
    pub fn fire<E: Event>(
        &self,
        instances: &dyn ObserverInstances,
        event: Arc<E>,
        qualifiers: &[Marker],
    ) -> EventResult<usize> {
        let closure = event_closure::<E>();
        let raw: SharedInstance = event;
        let targets: Vec<_> = self
            .matching(&closure, qualifiers)
            .into_iter()
            .filter(|(observer, _)| !observer.is_async())
            .collect();
        debug!(
            "触发事件: {}, {} 个同步观察者",
            std::any::type_name::<E>(),
            targets.len()
        );

        for (observer, binding) in &targets {
            let value = binding
                .view(&raw)
                .ok_or_else(|| view_failed::<E>(observer.name(), binding))?;
            observer.deliver(instances, value)?;
        }
        Ok(targets.len())
    }

    /// 异步触发事件，返回通知的观察者个数
    ///
    /// 只通知异步观察者，每个观察者在阻塞线程池上执行；
    /// 所有失败汇总为 [`EventError::AsyncDeliveryFailed`]
    pub async fn fire_async<E: Event>(
        &self,
        instances: Arc<dyn ObserverInstances>,
        event: Arc<E>,
        qualifiers: &[Marker],
    ) -> EventResult<usize> {
        let closure = event_closure::<E>();
        let raw: SharedInstance = event;
        let mut names = Vec::new();
        let mut tasks = Vec::new();
        let mut failures = Vec::new();
        for (observer, binding) in self.matching(&closure, qualifiers) {
            if !observer.is_async() {
                continue;
            }
            let Some(value) = binding.view(&raw) else {
                failures.push(view_failed::<E>(observer.name(), binding));
                continue;
            };
            let instances = Arc::clone(&instances);
            names.push(observer.name().to_string());
            tasks.push(tokio::task::spawn_blocking(move || {
                observer.deliver(instances.as_ref(), value)
            }));
        }
        debug!(
            "异步触发事件: {}, {} 个异步观察者",
            std::any::type_name::<E>(),
            tasks.len()
        );

        let delivered = tasks.len();
        for (name, joined) in names.into_iter().zip(join_all(tasks).await) {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(error)) => failures.push(error),
                Err(join_error) => failures.push(EventError::ObserverFailed {
                    observer: name,
                    source: Box::new(join_error),
                }),
            }
        }

        if failures.is_empty() {
            Ok(delivered)
        } else {
            warn!("异步事件投递失败: {} 个观察者出错", failures.len());
            Err(EventError::AsyncDeliveryFailed { failures })
        }
    }
}

/// 事件类型闭包中的绑定无法转换事件实例
fn view_failed<E: Event>(observer: &str, binding: &TypeBinding) -> EventError {
    warn!("事件类型转换失败: {} -> {}", std::any::type_name::<E>(), binding.key());
    EventError::ObserverFailed {
        observer: observer.to_string(),
        source: format!("事件 {} 无法转换为 {}", std::any::type_name::<E>(), binding.key()).into(),
    }
}
